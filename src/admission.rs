//! Handshake-time validation: path, subprotocol, token, node membership.
//!
//! `Admission` never touches `Gateway` state; it either produces an
//! `Admitted` request descriptor or an `AdmissionError` that the caller
//! turns into the literal HTTP 401 body. Invalid path *shape* (empty site,
//! non-digit experiment, ...) never reaches this module, the route table's
//! regex-constrained segments 404 those before a handler runs.

use crate::api::AuthApi;
use crate::domain::{Experiment, Mode, Node, Site};
use crate::error::AdmissionError;

/// A request that has passed every admission check, ready to become a
/// `Session`.
pub struct Admitted {
    pub user: String,
    pub site: Site,
    pub experiment: Experiment,
    pub node: Node,
    pub mode: Mode,
}

/// Splits the `Sec-WebSocket-Protocol` header value into its three
/// comma-separated, whitespace-trimmed tokens. Returns `None` if the header
/// is absent or does not carry exactly three tokens.
fn parse_subprotocols(header: Option<&str>) -> Option<[String; 3]> {
    let header = header?;
    let tokens: Vec<String> = header.split(',').map(|t| t.trim().to_owned()).collect();
    let [a, b, c]: [String; 3] = tokens.try_into().ok()?;
    Some([a, b, c])
}

/// Runs the full admission sequence for an incoming upgrade request whose
/// path has already matched a `(site, experiment, node, mode)` route.
pub async fn admit(
    protocol_header: Option<&str>,
    site: Site,
    experiment: Experiment,
    node: Node,
    mode: Mode,
    auth_api: &dyn AuthApi,
) -> Result<Admitted, AdmissionError> {
    let [user, selected, req_token] =
        parse_subprotocols(protocol_header).ok_or(AdmissionError::InvalidSubprotocols)?;
    if selected != "token" {
        return Err(AdmissionError::InvalidSubprotocols);
    }

    let expected_token = auth_api.fetch_token(&experiment).await?;
    if expected_token != req_token {
        return Err(AdmissionError::InvalidToken(req_token));
    }

    let nodes = auth_api.fetch_nodes(&experiment).await?;
    let member = nodes.iter().any(|entry| match entry.split_once('.') {
        Some((node_part, site_part)) => node_part == node.as_str() && site_part == site.as_str(),
        None => false,
    });
    if !member {
        return Err(AdmissionError::InvalidNode);
    }

    Ok(Admitted {
        user,
        site,
        experiment,
        node,
        mode,
    })
}
