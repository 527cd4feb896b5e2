//! Decoding of Autodiscover response documents.

use crate::config::{AUTODISCOVER_OUTLOOK_RESPONSE_NS, AUTODISCOVER_RESPONSE_ROOT_NS};
use crate::xml::Element;

/// The parts of an Autodiscover answer that drive the query state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AutodiscoverAnswer {
    /// `Account/Action`, empty when absent or when `Response` is out of namespace
    pub action: String,
    pub redirect_addr: String,
    pub redirect_url: String,
    /// `Response/Error` code and message
    pub error: Option<(i64, String)>,
}

/// Decodes `body` as an Autodiscover response.
///
/// The root must be `<Autodiscover>` in the response schema namespace. A
/// `<Response>` outside the Outlook namespace is treated as absent, which
/// leaves every field empty.
///
/// # Errors
///
/// Returns the decoding failure text (without the `failed to unmarshal XML`
/// prefix).
pub(crate) fn decode_answer(body: &str) -> Result<AutodiscoverAnswer, String> {
    let root = Element::parse(body).map_err(|e| e.to_string())?;
    if root.name != "Autodiscover" {
        return Err(format!(
            "expected element type <Autodiscover> but have <{}>",
            root.name
        ));
    }
    if root.namespace.as_deref() != Some(AUTODISCOVER_RESPONSE_ROOT_NS) {
        return Err(format!(
            "expected element <Autodiscover> in name space {AUTODISCOVER_RESPONSE_ROOT_NS} but have {}",
            root.namespace.as_deref().unwrap_or("no name space")
        ));
    }

    let mut answer = AutodiscoverAnswer::default();
    let Some(response) = root.child_ns("Response", AUTODISCOVER_OUTLOOK_RESPONSE_NS) else {
        return Ok(answer);
    };

    if let Some(account) = response.child("Account") {
        answer.action = account.child_text("Action").unwrap_or_default().to_string();
        answer.redirect_addr = account
            .child_text("RedirectAddr")
            .unwrap_or_default()
            .to_string();
        answer.redirect_url = account
            .child_text("RedirectUrl")
            .unwrap_or_default()
            .to_string();
    }

    if let Some(error) = response.child("Error") {
        let raw_code = error.child_text("ErrorCode").unwrap_or_default();
        let code = if raw_code.is_empty() {
            0
        } else {
            raw_code
                .parse::<i64>()
                .map_err(|e| format!("invalid ErrorCode {raw_code:?}: {e}"))?
        };
        let message = error.child_text("Message").unwrap_or_default().to_string();
        answer.error = Some((code, message));
    }

    Ok(answer)
}
