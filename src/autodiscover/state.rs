//! The per-attempt Autodiscover query state machine.
//!
//! One attempt walks `Querying -> (Redirecting | FollowRedirectAddr |
//! FollowRedirectUrl)* -> Done`. HTTP redirects, `redirectAddr` answers and
//! `redirectUrl` answers each have their own counter, bounded independently.

use reqwest::header::{CONTENT_TYPE, LOCATION};
use url::Url;

use super::response::{decode_answer, AutodiscoverAnswer};
use super::AutodiscoverResolver;
use crate::config::{
    AUTODISCOVER_OUTLOOK_RESPONSE_NS, AUTODISCOVER_REQUEST_SCHEMA, MAX_REDIRECTS,
    MAX_REDIRECT_ADDR, MAX_REDIRECT_URL,
};
use crate::models::{CertInfo, RedirectHop};

/// How requests are issued along one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// POST the request document; `redirectAddr` answers are followed
    Post,
    /// Plain GET; a `redirectAddr` answer is returned as the payload
    Get,
}

/// Final outcome of one attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptOutcome {
    /// One hop per request, in request order
    pub redirects: Vec<RedirectHop>,
    /// Raw payload or classified failure string
    pub config: String,
    /// Certificate facts, only for a `settings` answer over HTTPS
    pub cert_info: Option<CertInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Terminal {
    config: String,
    cert_info: Option<CertInfo>,
    error: Option<String>,
}

impl Terminal {
    fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    fn payload(config: String) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
enum State {
    Querying { uri: String, email: String },
    Redirecting { from: String, location: String, email: String },
    FollowRedirectAddr { uri: String, email: String },
    FollowRedirectUrl { uri: String, email: String },
    Done(Terminal),
}

#[derive(Debug, Default)]
struct LoopCounters {
    redirects: u32,
    redirect_addr: u32,
    redirect_url: u32,
}

/// Request document announcing `email` and the Outlook response schema.
pub(crate) fn request_body(email: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Autodiscover xmlns="{AUTODISCOVER_REQUEST_SCHEMA}">
  <Request>
    <EMailAddress>{}</EMailAddress>
    <AcceptableResponseSchema>{AUTODISCOVER_OUTLOOK_RESPONSE_NS}</AcceptableResponseSchema>
  </Request>
</Autodiscover>"#,
        quick_xml::escape::escape(email)
    )
}

/// Resolves a `Location` value against the URI that returned it.
pub(crate) fn resolve_location(base: &str, location: &str) -> Result<String, String> {
    Url::parse(location)
        .or_else(|_| Url::parse(base).and_then(|b| b.join(location)))
        .map(String::from)
        .map_err(|_| format!("failed to parse redirect URL: {location}"))
}

impl AutodiscoverResolver {
    /// Runs one attempt starting at `uri` for `email`.
    ///
    /// Never fails: every failure is folded into the returned outcome.
    pub async fn run_attempt(&self, uri: &str, email: &str, mode: QueryMode) -> AttemptOutcome {
        let mut redirects = Vec::new();
        let mut counters = LoopCounters::default();
        let mut state = State::Querying {
            uri: uri.to_string(),
            email: email.to_string(),
        };

        loop {
            state = match state {
                State::Querying { uri, email } => {
                    self.query_once(uri, email, mode, &mut redirects).await
                }
                State::Redirecting {
                    from,
                    location,
                    email,
                } => {
                    counters.redirects += 1;
                    if counters.redirects > MAX_REDIRECTS {
                        State::Done(Terminal::error("too many redirect times"))
                    } else {
                        match resolve_location(&from, &location) {
                            Ok(uri) => {
                                log::debug!("Autodiscover redirect {from} -> {uri}");
                                State::Querying { uri, email }
                            }
                            Err(e) => State::Done(Terminal::error(e)),
                        }
                    }
                }
                State::FollowRedirectAddr { uri, email } => {
                    counters.redirect_addr += 1;
                    if email.is_empty() {
                        State::Done(Terminal::error("nil ReAddr"))
                    } else if counters.redirect_addr > MAX_REDIRECT_ADDR {
                        State::Done(Terminal::error("too many RedirectAddr"))
                    } else {
                        State::Querying { uri, email }
                    }
                }
                State::FollowRedirectUrl { uri, email } => {
                    counters.redirect_url += 1;
                    if uri.is_empty() {
                        State::Done(Terminal::error(match mode {
                            QueryMode::Post => "nil Reuri",
                            QueryMode::Get => "nil Reurl",
                        }))
                    } else if counters.redirect_url > MAX_REDIRECT_URL {
                        State::Done(Terminal::error("too many RedirectUrl"))
                    } else {
                        State::Querying { uri, email }
                    }
                }
                State::Done(terminal) => {
                    return AttemptOutcome {
                        redirects,
                        config: terminal.config,
                        cert_info: terminal.cert_info,
                        error: terminal.error,
                    };
                }
            };
        }
    }

    /// Sends one request and decides the next state from its answer.
    async fn query_once(
        &self,
        uri: String,
        email: String,
        mode: QueryMode,
        redirects: &mut Vec<RedirectHop>,
    ) -> State {
        let request = match mode {
            QueryMode::Post => self
                .client
                .post(&uri)
                .header(CONTENT_TYPE, "text/xml")
                .body(request_body(&email)),
            QueryMode::Get => self.client.get(&uri),
        };
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return State::Done(Terminal::error(format!("failed to send request: {e}")));
            }
        };

        let status = response.status().as_u16();
        redirects.push(RedirectHop {
            url: uri.clone(),
            status,
        });

        match status {
            301 | 302 => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if location.is_empty() {
                    return State::Done(Terminal::error("missing Location header in redirect"));
                }
                State::Redirecting {
                    from: uri,
                    location,
                    email,
                }
            }
            200..=299 => {
                let body = match response.bytes().await {
                    Ok(body) => String::from_utf8_lossy(&body).into_owned(),
                    Err(e) => {
                        return State::Done(Terminal::error(format!(
                            "failed to read response body: {e}"
                        )));
                    }
                };
                match decode_answer(&body) {
                    Ok(answer) => self.interpret(answer, body, uri, email, mode).await,
                    Err(e) => State::Done(Terminal::error(format!("failed to unmarshal XML: {e}"))),
                }
            }
            _ => {
                let config = match mode {
                    QueryMode::Post => format!("Bad response for {email}: {status}\n"),
                    QueryMode::Get => format!("Bad response for {email}:{status}\n"),
                };
                State::Done(Terminal {
                    config,
                    cert_info: None,
                    error: Some(format!("unexpected status code: {status}")),
                })
            }
        }
    }

    async fn interpret(
        &self,
        answer: AutodiscoverAnswer,
        body: String,
        uri: String,
        email: String,
        mode: QueryMode,
    ) -> State {
        match answer.action.as_str() {
            "redirectAddr" => match mode {
                QueryMode::Post => State::FollowRedirectAddr {
                    uri,
                    email: answer.redirect_addr,
                },
                QueryMode::Get if answer.redirect_addr.is_empty() => {
                    State::Done(Terminal::error("nil ReAddr"))
                }
                QueryMode::Get => State::Done(Terminal::payload(body)),
            },
            "redirectUrl" => State::FollowRedirectUrl {
                uri: answer.redirect_url,
                email,
            },
            "settings" => {
                let cert_info = self.validator.capture_url(&uri).await;
                State::Done(Terminal {
                    config: body,
                    cert_info,
                    error: None,
                })
            }
            _ => match answer.error {
                Some((code, message)) => {
                    State::Done(Terminal::payload(format!("Errorcode:{code}-{message}\n")))
                }
                None => State::Done(Terminal::payload(format!(
                    "Non-valid Response element for {email}\n:"
                ))),
            },
        }
    }
}
