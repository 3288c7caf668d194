use crate::config::Config;
use crate::dns::handlers::{send_auth_resp, send_error, send_nxdomain};
use crate::error::Error;
use crate::zones::Zones;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::net::IpAddr;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::error;
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::{LowerName, Name, RData, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// TTL of the static records.
const STATIC_TTL: u32 = 300;

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day]");
}

/// Serves the static records of the [`Config`]: SOA at each zone apex, NS and A/AAAA.
///
/// Used as the downstream handler for queries the challenge [`Handler`][super::Handler]
/// forwards. Other in-zone names get NXDOMAIN and names outside the zones are refused.
pub struct StaticHandler {
    zones: Zones,
    soa: Option<(Name, Name)>,
    addrs: HashMap<LowerName, Vec<IpAddr>>,
    ns_records: HashMap<LowerName, Vec<LowerName>>,
}

impl StaticHandler {
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if the configured `ns_admin` isn't a valid name.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let soa = match (&config.ns_domain, config.ns_admin()?) {
            (Some(ns_domain), Some(ns_admin)) => Some((ns_domain.into(), ns_admin)),
            _ => None,
        };
        Ok(StaticHandler {
            zones: config.zones(),
            soa,
            addrs: config.addrs.clone(),
            ns_records: config.ns_records.clone(),
        })
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return send_error(request, response_handle, ResponseCode::NotImp).await;
        }

        let name = request.query().name();
        let Some(zone) = self.zones.matches(name) else {
            return send_error(request, response_handle, ResponseCode::Refused).await;
        };
        let apex = zone == name;

        let rdata = match request.query().query_type() {
            RecordType::SOA if apex => self.soa_rdata(),
            RecordType::A => self.a_rdata(name),
            RecordType::AAAA => self.aaaa_rdata(name),
            RecordType::NS => self.ns_rdata(name),
            _ => vec![],
        };
        if rdata.is_empty() && !apex && !self.is_known(name) {
            return send_nxdomain(request, response_handle).await;
        }
        send_auth_resp(request, response_handle, rdata, STATIC_TTL).await
    }

    fn is_known(&self, name: &LowerName) -> bool {
        self.addrs.contains_key(name) || self.ns_records.contains_key(name)
    }

    fn soa_rdata(&self) -> Vec<RData> {
        let Some((ns_domain, ns_admin)) = &self.soa else {
            return vec![];
        };
        let serial: u32 = OffsetDateTime::now_utc()
            .format(&SERIAL_FORMATTER)
            .ok()
            .and_then(|serial| serial.parse().ok())
            .unwrap_or_default();
        // See RIPE 203[0] for recommended values.
        // [0]: https://www.ripe.net/publications/docs/ripe-203
        vec![RData::SOA(SOA::new(
            ns_domain.clone(),
            ns_admin.clone(),
            serial,
            86_400,    // 24 hrs.
            7_200,     // 2 hours.
            3_600_000, // 1000 hours.
            172_800,   // 2 days.
        ))]
    }

    fn a_rdata(&self, fqdn: &LowerName) -> Vec<RData> {
        self.addrs
            .get(fqdn)
            .into_iter()
            .flatten()
            .filter_map(|ip| match ip {
                IpAddr::V4(ipv4_addr) => Some(RData::A(*ipv4_addr)),
                IpAddr::V6(_) => None,
            })
            .collect()
    }

    fn aaaa_rdata(&self, fqdn: &LowerName) -> Vec<RData> {
        self.addrs
            .get(fqdn)
            .into_iter()
            .flatten()
            .filter_map(|ip| match ip {
                IpAddr::V4(_) => None,
                IpAddr::V6(ipv6_addr) => Some(RData::AAAA(*ipv6_addr)),
            })
            .collect()
    }

    fn ns_rdata(&self, fqdn: &LowerName) -> Vec<RData> {
        self.ns_records
            .get(fqdn)
            .into_iter()
            .flatten()
            .map(|n| RData::NS(n.into()))
            .collect()
    }
}

#[async_trait::async_trait]
impl RequestHandler for StaticHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::handlers::tests::query;
    use std::str::FromStr;

    fn handler(with_soa: bool) -> StaticHandler {
        let mut config = serde_json::json!({
            "zones": ["example.org"],
            "dns_udp_bind_addr": "127.0.0.1:5353",
            "dns_tcp_bind_addr": "127.0.0.1:5353",
            "addrs": {"ns1.example.org": ["192.0.2.1", "2001:db8::1"]},
            "ns_records": {"example.org": ["ns1.example.org"]},
        });
        if with_soa {
            config["ns_domain"] = serde_json::json!("ns1.example.org");
            config["ns_admin"] = serde_json::json!("hostmaster@example.org");
        }
        StaticHandler::from_config(&Config::from_str(&config.to_string()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn soa_at_apex() {
        let message = query(&handler(true), "example.org.", RecordType::SOA).await;
        assert_eq!(message.response_code(), ResponseCode::NoError);
        assert!(message.authoritative());
        let Some(RData::SOA(soa)) = message.answers()[0].data() else {
            panic!("expected SOA: {message:?}");
        };
        assert_eq!(soa.mname().to_string(), "ns1.example.org.");
        assert_eq!(soa.rname().to_string(), "hostmaster.example.org.");
        assert!(soa.serial() > 2023_00_00);
    }

    #[tokio::test]
    async fn apex_without_soa_config_is_empty() {
        let message = query(&handler(false), "example.org.", RecordType::SOA).await;
        assert_eq!(message.response_code(), ResponseCode::NoError);
        assert!(message.answers().is_empty());
    }

    #[tokio::test]
    async fn addresses_by_family() {
        let handler = handler(false);
        let message = query(&handler, "ns1.example.org.", RecordType::A).await;
        assert_eq!(message.answers().len(), 1);
        assert_eq!(
            message.answers()[0].data(),
            Some(&RData::A("192.0.2.1".parse().unwrap()))
        );

        let message = query(&handler, "ns1.example.org.", RecordType::AAAA).await;
        assert_eq!(message.answers().len(), 1);
        assert_eq!(
            message.answers()[0].data(),
            Some(&RData::AAAA("2001:db8::1".parse().unwrap()))
        );
    }

    #[tokio::test]
    async fn ns_records() {
        let message = query(&handler(false), "example.org.", RecordType::NS).await;
        assert_eq!(
            message.answers()[0].data(),
            Some(&RData::NS(Name::from_ascii("ns1.example.org.").unwrap()))
        );
    }

    #[tokio::test]
    async fn unknown_and_foreign_names() {
        let handler = handler(true);
        let message = query(&handler, "_acme-challenge.example.org.", RecordType::TXT).await;
        assert_eq!(message.response_code(), ResponseCode::NXDomain);
        assert!(message.authoritative());

        let message = query(&handler, "ns1.example.org.", RecordType::MX).await;
        assert_eq!(message.response_code(), ResponseCode::NoError);
        assert!(message.answers().is_empty());

        let message = query(&handler, "example.com.", RecordType::A).await;
        assert_eq!(message.response_code(), ResponseCode::Refused);
    }
}
