//! Geo and network-origin evaluators.
//!
//! Country codes are ISO 3166 alpha-2, compared case-insensitively (the
//! rule side is uppercased at insert). CIDR matching covers IPv4 and IPv6
//! including compressed form; IPv4-mapped IPv6 addresses match IPv4
//! ranges.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;

use crate::domain::model::PolicyContext;

/// Is the request country in the list? False when the country is unknown.
#[must_use]
pub fn country_in(ctx: &PolicyContext, countries: &[String]) -> bool {
    let Some(country) = ctx.environment.country.as_deref() else {
        return false;
    };
    let country = country.to_ascii_uppercase();
    countries
        .iter()
        .any(|candidate| candidate.to_ascii_uppercase() == country)
}

/// Is the request ip inside any of the CIDR ranges?
/// Unknown or unparseable ip, or no parseable range, is false.
#[must_use]
pub fn ip_in_ranges(ctx: &PolicyContext, ranges: &[String]) -> bool {
    let Some(ip) = ctx.environment.ip.as_deref() else {
        return false;
    };
    let Ok(ip) = IpAddr::from_str(ip) else {
        return false;
    };
    ranges
        .iter()
        .filter_map(|range| IpNetwork::from_str(range).ok())
        .any(|network| ip_in_cidr(ip, &network))
}

/// One ip against one network. Families must agree, except that an
/// IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) is matched against IPv4
/// ranges through its embedded address.
#[must_use]
pub fn ip_in_cidr(ip: IpAddr, network: &IpNetwork) -> bool {
    match (ip, network) {
        (IpAddr::V4(_), IpNetwork::V4(_)) | (IpAddr::V6(_), IpNetwork::V6(_)) => {
            network.contains(ip)
        }
        (IpAddr::V6(v6), IpNetwork::V4(_)) => v6
            .to_ipv4_mapped()
            .is_some_and(|v4| network.contains(IpAddr::V4(v4))),
        (IpAddr::V4(_), IpNetwork::V6(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SubjectAttributes;

    fn ctx_with(ip: Option<&str>, country: Option<&str>) -> PolicyContext {
        let mut ctx = PolicyContext::new(
            SubjectAttributes {
                id: "user_123".to_owned(),
                ..Default::default()
            },
            "read",
        );
        ctx.environment.ip = ip.map(ToOwned::to_owned);
        ctx.environment.country = country.map(ToOwned::to_owned);
        ctx
    }

    #[test]
    fn country_comparison_is_case_insensitive() {
        let ctx = ctx_with(None, Some("de"));
        assert!(country_in(&ctx, &["DE".to_owned()]));
        assert!(!country_in(&ctx, &["FR".to_owned()]));
        assert!(!country_in(&ctx_with(None, None), &["DE".to_owned()]));
    }

    #[test]
    fn ipv4_cidr_membership() {
        let inside = ctx_with(Some("192.168.1.100"), None);
        let outside = ctx_with(Some("192.168.2.1"), None);
        let ranges = vec!["192.168.1.0/24".to_owned()];
        assert!(ip_in_ranges(&inside, &ranges));
        assert!(!ip_in_ranges(&outside, &ranges));
    }

    #[test]
    fn ipv6_compressed_form() {
        let ctx = ctx_with(Some("2001:db8::1"), None);
        assert!(ip_in_ranges(&ctx, &["2001:db8::/32".to_owned()]));
        assert!(!ip_in_ranges(&ctx, &["2001:db9::/32".to_owned()]));
    }

    #[test]
    fn ipv4_mapped_ipv6_matches_v4_ranges() {
        let ctx = ctx_with(Some("::ffff:192.168.1.100"), None);
        assert!(ip_in_ranges(&ctx, &["192.168.1.0/24".to_owned()]));
    }

    #[test]
    fn default_routes_partition_by_family() {
        let v4: IpAddr = "203.0.113.9".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let any_v4: IpNetwork = "0.0.0.0/0".parse().unwrap();
        let any_v6: IpNetwork = "::/0".parse().unwrap();

        assert!(ip_in_cidr(v4, &any_v4));
        assert!(!ip_in_cidr(v4, &any_v6));
        assert!(ip_in_cidr(v6, &any_v6));
        assert!(!ip_in_cidr(v6, &any_v4));
    }

    #[test]
    fn junk_input_is_false() {
        let ctx = ctx_with(Some("not-an-ip"), None);
        assert!(!ip_in_ranges(&ctx, &["0.0.0.0/0".to_owned()]));
        let ctx = ctx_with(Some("192.168.1.1"), None);
        assert!(!ip_in_ranges(&ctx, &["not-a-range".to_owned()]));
        assert!(!ip_in_ranges(&ctx_with(None, None), &["0.0.0.0/0".to_owned()]));
    }
}
