use std::sync::Arc;

use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::EvaluatorResult;

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    roots
}

// TLS is only exercised when an operator opts into a remote oracle; the
// default loopback endpoint goes over plain HTTP through the same client.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_client() -> EvaluatorResult<HyperClient> {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_root_store())
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));
    Ok(Client::builder().build::<_, Body>(connector))
}
