use std::net::IpAddr;

use discovery::{Field, FieldValue, Record, zip_fields};
use ipnet::IpNet;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("no usable ipv4 or ipv6 address found in {0:?}")]
    NoUsableAddress(Vec<String>),
}

/// At most one host address per family.
///
/// Addresses are kept as the API wrote them, they are not re-formatted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IpAddresses {
    pub ipv4: String,
    pub ipv6: String,
}

static IP_ADDRESSES_FIELDS: [Field; 2] = [
    Field::new("ipv4").label("ipv4"),
    Field::new("ipv6").label("ipv6"),
];

impl IpAddresses {
    /// The address to scrape, IPv4 first and IPv6 when there is no IPv4.
    pub fn preferred(&self) -> &str {
        if self.ipv4.is_empty() {
            &self.ipv6
        } else {
            &self.ipv4
        }
    }
}

impl Record for IpAddresses {
    fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)> {
        zip_fields(
            &IP_ADDRESSES_FIELDS,
            [(&self.ipv4).into(), (&self.ipv6).into()],
        )
    }
}

/// Pick one IPv4 and one IPv6 host address out of `addresses`.
///
/// Entries are `address` or `address/prefix`, an entry with a prefix is a
/// host only if the prefix covers the whole address (`/32` or `/128`).
/// Subnets, unspecified and malformed entries are ignored. When a family
/// shows up more than once, the last entry wins.
pub fn classify<S: AsRef<str>>(addresses: &[S]) -> Result<IpAddresses, Error> {
    let mut ips = IpAddresses::default();

    for entry in addresses {
        let Some((text, addr)) = parse_host(entry.as_ref().trim()) else {
            continue;
        };

        if addr.is_unspecified() {
            continue;
        }

        match addr {
            IpAddr::V4(_) => ips.ipv4 = text.to_string(),
            IpAddr::V6(_) => ips.ipv6 = text.to_string(),
        }
    }

    if ips.ipv4.is_empty() && ips.ipv6.is_empty() {
        return Err(Error::NoUsableAddress(
            addresses
                .iter()
                .map(|entry| entry.as_ref().to_string())
                .collect(),
        ));
    }

    Ok(ips)
}

/// Returns the address part of `entry` and the parsed address, `None` for
/// subnets and anything which cannot be parsed.
fn parse_host(entry: &str) -> Option<(&str, IpAddr)> {
    match entry.split_once('/') {
        None => entry.parse::<IpAddr>().ok().map(|addr| (entry, addr)),
        Some((text, _prefix)) => {
            let net = entry.parse::<IpNet>().ok()?;
            if net.prefix_len() != net.max_prefix_len() {
                return None;
            }

            Some((text, net.addr()))
        }
    }
}
