//! Autodiscover state machine tests against mock HTTP servers.

use std::sync::Arc;

use httptest::{matchers::*, responders::*, Expectation, Server};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::config::Config;
use crate::dns::test_server::Zone;
use crate::initialization::init_client;
use crate::tls::TrustAnchors;

const EMAIL: &str = "info@example.com";

fn resolver_with_dns(dns: std::net::SocketAddr) -> AutodiscoverResolver {
    let client = init_client(&Config::default()).expect("client");
    let validator = CertificateValidator::new(
        Arc::new(TrustAnchors::unavailable("no roots in tests")),
        client.clone(),
    );
    AutodiscoverResolver::new(client, Arc::new(DnsClient::new(dns)), Arc::new(validator))
}

fn resolver() -> AutodiscoverResolver {
    // Never queried by the HTTP-only tests
    resolver_with_dns("127.0.0.1:9".parse().unwrap())
}

fn answer(account_or_error: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006">
  <Response xmlns="http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a">
    {account_or_error}
  </Response>
</Autodiscover>"#
    )
}

fn settings() -> String {
    answer(
        "<Account><AccountType>email</AccountType><Action>settings</Action>\
         <Protocol><Type>IMAP</Type><Server>imap.example.com</Server><Port>993</Port><SSL>on</SSL></Protocol>\
         </Account>",
    )
}

#[tokio::test]
async fn test_eleventh_redirect_is_terminal() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/loop"))
            .times(11)
            .respond_with(status_code(302).insert_header("Location", "/loop")),
    );

    let uri = server.url("/loop").to_string();
    let outcome = resolver().run_attempt(&uri, EMAIL, QueryMode::Post).await;

    assert_eq!(outcome.error.as_deref(), Some("too many redirect times"));
    assert_eq!(outcome.redirects.len(), 11);
    assert!(outcome.redirects.iter().all(|hop| hop.status == 302));
    assert!(outcome.config.is_empty());
}

#[tokio::test]
async fn test_redirect_then_settings() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/start"))
            .respond_with(status_code(301).insert_header("Location", "/final")),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", "/final"))
            .respond_with(status_code(200).body(settings())),
    );

    let uri = server.url("/start").to_string();
    let outcome = resolver().run_attempt(&uri, EMAIL, QueryMode::Post).await;

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.config, settings());
    // Plain HTTP answers carry no certificate facts
    assert!(outcome.cert_info.is_none());
    assert_eq!(outcome.redirects.len(), 2);
    assert_eq!(outcome.redirects[0].url, uri);
    assert_eq!(outcome.redirects[0].status, 301);
    assert_eq!(outcome.redirects[1].url, server.url("/final").to_string());
    assert_eq!(outcome.redirects[1].status, 200);
}

#[tokio::test]
async fn test_redirect_addr_requeries_same_uri_with_new_address() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/autodiscover/autodiscover.xml"))
        .and(header("content-type", "text/xml"))
        .and(body_string_contains("info@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string(answer(
            "<Account><Action>redirectAddr</Action><RedirectAddr>user2@example.net</RedirectAddr></Account>",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/autodiscover/autodiscover.xml"))
        .and(body_string_contains("user2@example.net"))
        .respond_with(ResponseTemplate::new(200).set_body_string(settings()))
        .expect(1)
        .mount(&server)
        .await;

    let uri = format!("{}/autodiscover/autodiscover.xml", server.uri());
    let outcome = resolver().run_attempt(&uri, EMAIL, QueryMode::Post).await;

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.config, settings());
    assert_eq!(outcome.redirects.len(), 2);
    assert_eq!(outcome.redirects[0].url, outcome.redirects[1].url);
}

#[tokio::test]
async fn test_redirect_addr_loop_is_bounded() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/ad"))
            .times(11)
            .respond_with(status_code(200).body(answer(
                "<Account><Action>redirectAddr</Action><RedirectAddr>loop@example.com</RedirectAddr></Account>",
            ))),
    );

    let uri = server.url("/ad").to_string();
    let outcome = resolver().run_attempt(&uri, EMAIL, QueryMode::Post).await;
    assert_eq!(outcome.error.as_deref(), Some("too many RedirectAddr"));
    assert_eq!(outcome.redirects.len(), 11);
}

#[tokio::test]
async fn test_redirect_url_loop_is_bounded() {
    let server = Server::run();
    let target = server.url("/url").to_string();
    server.expect(
        Expectation::matching(request::method_path("POST", "/url"))
            .times(11)
            .respond_with(status_code(200).body(answer(&format!(
                "<Account><Action>redirectUrl</Action><RedirectUrl>{target}</RedirectUrl></Account>"
            )))),
    );

    let outcome = resolver()
        .run_attempt(&target, EMAIL, QueryMode::Post)
        .await;
    assert_eq!(outcome.error.as_deref(), Some("too many RedirectUrl"));
    assert_eq!(outcome.redirects.len(), 11);
}

#[tokio::test]
async fn test_counters_are_independent() {
    // Nine HTTP redirects followed by nine redirectUrl answers stay within bounds
    let server = MockServer::start().await;
    for i in 0..9 {
        Mock::given(method("POST"))
            .and(path(format!("/r{i}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/r{}", i + 1)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    for i in 9..18 {
        let next = format!("{}/r{}", server.uri(), i + 1);
        Mock::given(method("POST"))
            .and(path(format!("/r{i}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(answer(&format!(
                "<Account><Action>redirectUrl</Action><RedirectUrl>{next}</RedirectUrl></Account>"
            ))))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/r18"))
        .respond_with(ResponseTemplate::new(200).set_body_string(settings()))
        .expect(1)
        .mount(&server)
        .await;

    let uri = format!("{}/r0", server.uri());
    let outcome = resolver().run_attempt(&uri, EMAIL, QueryMode::Post).await;
    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.redirects.len(), 19);
}

#[tokio::test]
async fn test_empty_redirect_targets() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/addr")).respond_with(
            status_code(200).body(answer(
                "<Account><Action>redirectAddr</Action><RedirectAddr></RedirectAddr></Account>",
            )),
        ),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/url")).respond_with(
            status_code(200).body(answer("<Account><Action>redirectUrl</Action></Account>")),
        ),
    );

    let resolver = resolver();
    let outcome = resolver
        .run_attempt(&server.url("/addr").to_string(), EMAIL, QueryMode::Post)
        .await;
    assert_eq!(outcome.error.as_deref(), Some("nil ReAddr"));

    let outcome = resolver
        .run_attempt(&server.url("/url").to_string(), EMAIL, QueryMode::Get)
        .await;
    assert_eq!(outcome.error.as_deref(), Some("nil Reurl"));
}

#[tokio::test]
async fn test_vendor_error_is_payload_not_error() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/err")).respond_with(
            status_code(200).body(answer(
                "<Error Time=\"10:00:00\" Id=\"1\"><ErrorCode>500</ErrorCode><Message>The email address can't be found.</Message></Error>",
            )),
        ),
    );

    let outcome = resolver()
        .run_attempt(&server.url("/err").to_string(), EMAIL, QueryMode::Post)
        .await;
    assert!(outcome.error.is_none());
    assert_eq!(
        outcome.config,
        "Errorcode:500-The email address can't be found.\n"
    );
}

#[tokio::test]
async fn test_non_valid_response_element() {
    let server = Server::run();
    // Response without the Outlook namespace
    server.expect(
        Expectation::matching(request::method_path("POST", "/nv")).respond_with(
            status_code(200).body(
                r#"<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006"><Response><Account><Action>settings</Action></Account></Response></Autodiscover>"#,
            ),
        ),
    );

    let outcome = resolver()
        .run_attempt(&server.url("/nv").to_string(), EMAIL, QueryMode::Post)
        .await;
    assert!(outcome.error.is_none());
    assert_eq!(
        outcome.config,
        "Non-valid Response element for info@example.com\n:"
    );
}

#[tokio::test]
async fn test_unparsable_body() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/html"))
            .respond_with(status_code(200).body("<html><body>It works!</body></html>")),
    );

    let outcome = resolver()
        .run_attempt(&server.url("/html").to_string(), EMAIL, QueryMode::Post)
        .await;
    let error = outcome.error.unwrap();
    assert!(error.starts_with("failed to unmarshal XML"), "{error}");
    assert!(outcome.config.is_empty());
    assert_eq!(outcome.redirects.len(), 1);
}

#[tokio::test]
async fn test_bad_status_formats() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/gone")).respond_with(status_code(404)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/gone")).respond_with(status_code(403)),
    );

    let resolver = resolver();
    let uri = server.url("/gone").to_string();
    let post = resolver.run_attempt(&uri, EMAIL, QueryMode::Post).await;
    assert_eq!(post.config, "Bad response for info@example.com: 404\n");
    assert_eq!(post.error.as_deref(), Some("unexpected status code: 404"));

    let get = resolver.run_attempt(&uri, EMAIL, QueryMode::Get).await;
    assert_eq!(get.config, "Bad response for info@example.com:403\n");
    assert_eq!(get.error.as_deref(), Some("unexpected status code: 403"));
}

#[tokio::test]
async fn test_redirect_without_location() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/noloc")).respond_with(status_code(302)),
    );

    let outcome = resolver()
        .run_attempt(&server.url("/noloc").to_string(), EMAIL, QueryMode::Post)
        .await;
    assert_eq!(
        outcome.error.as_deref(),
        Some("missing Location header in redirect")
    );
    assert_eq!(outcome.redirects.len(), 1);
}

#[tokio::test]
async fn test_direct_get_returns_redirect_addr_payload() {
    let server = Server::run();
    let body = answer(
        "<Account><Action>redirectAddr</Action><RedirectAddr>other@example.org</RedirectAddr></Account>",
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/g"))
            .respond_with(status_code(200).body(body.clone())),
    );

    let outcome = resolver()
        .run_attempt(&server.url("/g").to_string(), EMAIL, QueryMode::Get)
        .await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.config, body);
}

#[tokio::test]
async fn test_transport_failure_is_recorded() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let uri = format!("http://127.0.0.1:{port}/autodiscover/autodiscover.xml");
    let outcome = resolver().run_attempt(&uri, EMAIL, QueryMode::Post).await;
    assert!(outcome
        .error
        .unwrap()
        .starts_with("failed to send request"));
    assert!(outcome.redirects.is_empty());
}

#[tokio::test]
async fn test_get_post_follows_into_post_machine() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/autodiscover/autodiscover.xml"))
            .respond_with(status_code(302).insert_header("Location", "/owa/autodiscover.xml")),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", "/owa/autodiscover.xml"))
            .respond_with(status_code(200).body(settings())),
    );

    let get_uri = server.url("/autodiscover/autodiscover.xml").to_string();
    let result = resolver()
        .query_get_post("example.com", &get_uri, EMAIL)
        .await;

    assert_eq!(result.method, "get-post");
    assert_eq!(result.index, 0);
    assert_eq!(result.uri, get_uri);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.config, settings());
    assert_eq!(result.redirects.len(), 2);
    assert_eq!(result.redirects[0].status, 302);
    assert_eq!(result.redirects[1].status, 200);
}

#[tokio::test]
async fn test_get_post_requires_redirect() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/autodiscover/autodiscover.xml"))
            .respond_with(status_code(200).body(settings())),
    );

    let get_uri = server.url("/autodiscover/autodiscover.xml").to_string();
    let result = resolver()
        .query_get_post("example.com", &get_uri, EMAIL)
        .await;
    assert_eq!(result.error.as_deref(), Some("not find Redirect Statuscode"));
    assert!(result.redirects.is_empty());
    assert!(result.config.is_empty());
}

#[tokio::test]
async fn test_srv_post_lookup_failure() {
    let dns = Zone::new().spawn().await;
    let result = resolver_with_dns(dns)
        .query_srv_post("example.com", EMAIL)
        .await;

    assert_eq!(result.method, "srv-post");
    assert_eq!(result.index, 0);
    let error = result.error.unwrap();
    assert!(
        error.starts_with("Failed to lookup SRV records for _autodiscover._tcp.example.com: "),
        "{error}"
    );
}

#[tokio::test]
async fn test_srv_post_dot_target_is_failure() {
    let dns = Zone::new()
        .srv("_autodiscover._tcp.example.com", 0, 0, 443, ".")
        .spawn()
        .await;
    let result = resolver_with_dns(dns)
        .query_srv_post("example.com", EMAIL)
        .await;
    assert!(result.error.unwrap().contains("hostname == '.'"));
}

#[test]
fn test_request_body_escapes_address() {
    let body = state::request_body("a<b@example.com");
    assert!(body.contains("<EMailAddress>a&lt;b@example.com</EMailAddress>"));
    assert!(body.contains(
        "http://schemas.microsoft.com/exchange/autodiscover/outlook/requestschema/2006"
    ));
    assert!(body.contains(
        "<AcceptableResponseSchema>http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a</AcceptableResponseSchema>"
    ));
}

#[test]
fn test_well_known_uri_order() {
    let uris = well_known_uris("example.com");
    assert_eq!(uris[0], "http://example.com/autodiscover/autodiscover.xml");
    assert_eq!(
        uris[1],
        "https://autodiscover.example.com/autodiscover/autodiscover.xml"
    );
    assert_eq!(
        uris[2],
        "http://autodiscover.example.com/autodiscover/autodiscover.xml"
    );
    assert_eq!(uris[3], "https://example.com/autodiscover/autodiscover.xml");
}

#[test]
fn test_resolve_location() {
    assert_eq!(
        state::resolve_location("http://a.example/x/y", "/z").unwrap(),
        "http://a.example/z"
    );
    assert_eq!(
        state::resolve_location("http://a.example/x", "https://b.example/q").unwrap(),
        "https://b.example/q"
    );
}

/// Client that sends `mail.test` and `autodiscover.mail.test` to `addr`.
fn mail_test_client(addr: std::net::SocketAddr) -> Arc<reqwest::Client> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .timeout(std::time::Duration::from_secs(5))
        .resolve("mail.test", addr)
        .resolve("autodiscover.mail.test", addr)
        .build()
        .unwrap();
    Arc::new(client)
}

#[tokio::test]
async fn test_query_all_runs_every_strategy_in_order() {
    let server = MockServer::start().await;
    // get-post and direct_get 3
    Mock::given(method("GET"))
        .and(path("/autodiscover/autodiscover.xml"))
        .and(header("host", "autodiscover.mail.test"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "http://mail.test/ews/autodiscover.xml"),
        )
        .expect(2)
        .mount(&server)
        .await;
    // direct_get 1
    Mock::given(method("GET"))
        .and(path("/autodiscover/autodiscover.xml"))
        .and(header("host", "mail.test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(settings()))
        .expect(1)
        .mount(&server)
        .await;
    // POST 1, POST 3 and srv-post
    Mock::given(method("POST"))
        .and(path("/autodiscover/autodiscover.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(settings()))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ews/autodiscover.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(settings()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ews/autodiscover.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(settings()))
        .expect(1)
        .mount(&server)
        .await;

    let dns = Zone::new()
        .srv("_autodiscover._tcp.mail.test", 0, 0, 80, "mail.test.")
        .spawn()
        .await;
    let client = mail_test_client(*server.address());
    let validator = CertificateValidator::new(
        Arc::new(TrustAnchors::unavailable("no roots in tests")),
        Arc::clone(&client),
    );
    let resolver =
        AutodiscoverResolver::new(client, Arc::new(DnsClient::new(dns)), Arc::new(validator));

    let results = resolver.query_all("mail.test").await;

    let labels: Vec<(&str, u32)> = results
        .iter()
        .map(|r| (r.method.as_str(), r.index))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("POST", 1),
            ("POST", 2),
            ("POST", 3),
            ("POST", 4),
            ("srv-post", 0),
            ("get-post", 0),
            ("direct_get", 1),
            ("direct_get", 2),
            ("direct_get", 3),
            ("direct_get", 4),
        ]
    );

    let uris = well_known_uris("mail.test");
    for (i, uri) in uris.iter().enumerate() {
        assert_eq!(&results[i].uri, uri);
        assert_eq!(&results[6 + i].uri, uri);
    }
    assert_eq!(results[4].uri, "http://mail.test/autodiscover/autodiscover.xml");
    assert_eq!(
        results[5].uri,
        "http://autodiscover.mail.test/autodiscover/autodiscover.xml"
    );
    assert!(results.iter().all(|r| r.domain == "mail.test"));

    // The plain HTTP server cannot complete a TLS handshake
    for i in [1, 3, 7, 9] {
        assert!(results[i].config.is_empty());
        assert!(results[i]
            .error
            .as_deref()
            .unwrap()
            .starts_with("failed to send request"));
    }
    for i in [0, 2, 4, 5, 6, 8] {
        assert_eq!(results[i].config, settings(), "record {i}");
        assert!(results[i].error.is_none(), "record {i}: {:?}", results[i].error);
    }

    let get_post = &results[5];
    assert_eq!(get_post.redirects.len(), 2);
    assert_eq!(get_post.redirects[0].status, 302);
    assert_eq!(get_post.redirects[1].url, "http://mail.test/ews/autodiscover.xml");
    assert_eq!(results[8].redirects.len(), 2);
}
