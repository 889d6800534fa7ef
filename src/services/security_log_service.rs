use actix_web::HttpRequest;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime, Document};

use crate::{
    database::{MongoDB, SECURITY_LOGS},
    models::{SecurityAction, SecurityLog},
};

/// Where a request came from, for the security log.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_request(req: &HttpRequest) -> Self {
        ClientInfo {
            ip: req.connection_info().realip_remote_addr().map(str::to_string),
            user_agent: req
                .headers()
                .get(actix_web::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Best effort: a failed write is logged and swallowed.
pub async fn record(
    db: &MongoDB,
    user: Option<ObjectId>,
    action: SecurityAction,
    client: &ClientInfo,
    details: Option<Document>,
) {
    let entry = SecurityLog {
        id: None,
        user,
        action,
        ip: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        details,
        created_at: BsonDateTime::now(),
    };

    if let Err(e) = db.collection::<SecurityLog>(SECURITY_LOGS).insert_one(&entry).await {
        log::warn!("⚠️  Failed to write security log {:?}: {}", action, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn client_info_reads_forwarded_ip_and_agent() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .insert_header(("User-Agent", "BizzyTest/1.0"))
            .to_http_request();
        let info = ClientInfo::from_request(&req);

        assert_eq!(info.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("BizzyTest/1.0"));
    }
}
