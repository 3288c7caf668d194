use crate::dns::resolver::{Resolution, Resolver};
use crate::error::Error;
use crate::metrics::Metrics;
use tracing::error;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::rdata::TXT;
use trust_dns_server::client::rr::{RData, Record};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// TTL of served challenge TXT records. Kept short so removed values disappear quickly from
/// resolver caches.
pub const TXT_TTL: u32 = 60;

/// Serves challenge TXT records from storage, handing every other query to `next`.
pub struct Handler<N> {
    resolver: Resolver,
    next: N,
    metrics: Metrics,
}

impl<N: RequestHandler> Handler<N> {
    pub fn new(resolver: Resolver, next: N, metrics: Metrics) -> Self {
        Handler {
            resolver,
            next,
            metrics,
        }
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return send_error(request, response_handle, ResponseCode::NotImp).await;
        }

        let query = request.query();
        let name = query.name();
        let resolution = self.resolver.resolve(name, query.query_type()).await;
        if self.resolver.in_zone(name) {
            self.metrics.inc_dns(resolution.outcome());
        }
        tracing::debug!(
            "{} {name} {} from {}: {}",
            query.query_class(),
            query.query_type(),
            request.src(),
            resolution.outcome()
        );

        match resolution {
            Resolution::Answer(values) => {
                let rdata = values
                    .into_iter()
                    .map(|value| RData::TXT(TXT::new(vec![value])))
                    .collect();
                send_auth_resp(request, response_handle, rdata, TXT_TTL).await
            }
            Resolution::NoData => send_auth_resp(request, response_handle, vec![], TXT_TTL).await,
            Resolution::NameError => send_nxdomain(request, response_handle).await,
            Resolution::Forward => Ok(self.next.handle_request(request, response_handle).await),
            Resolution::ServerFailure(err) => {
                error!("storage failure resolving {name}: {err}");
                send_error(request, response_handle, ResponseCode::ServFail).await
            }
        }
    }
}

#[async_trait::async_trait]
impl<N: RequestHandler> RequestHandler for Handler<N> {
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

/// Answer authoritatively with one record per `rdata`. No records is an empty NOERROR answer.
pub(super) async fn send_auth_resp<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    rdata: Vec<RData>,
    ttl: u32,
) -> Result<ResponseInfo, Error> {
    let records: Vec<Record> = rdata
        .into_iter()
        .map(|rd| Record::from_rdata(request.query().name().into(), ttl, rd))
        .collect();
    let mut header = Header::response_from_request(request.header());
    header.set_authoritative(true);
    let builder = MessageResponseBuilder::from_message_request(request);
    let response = builder.build(header, records.iter(), &[], &[], &[]);
    Ok(response_handle.send_response(response).await?)
}

pub(super) async fn send_nxdomain<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
) -> Result<ResponseInfo, Error> {
    let builder = MessageResponseBuilder::from_message_request(request);
    let mut header = Header::response_from_request(request.header());
    header.set_authoritative(true);
    header.set_response_code(ResponseCode::NXDomain);
    let response = builder.build_no_records(header);
    Ok(response_handle.send_response(response).await?)
}

pub(super) async fn send_error<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    code: ResponseCode,
) -> Result<ResponseInfo, Error> {
    let response = MessageResponseBuilder::from_message_request(request);
    Ok(response_handle
        .send_response(response.error_msg(request.header(), code))
        .await?)
}
