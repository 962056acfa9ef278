//! End-to-end probe behavior against a local mock server.
//!
//! Production rules block loopback, so every test config sets
//! `allow_loopback`; the exemption is scoped to loopback and the other
//! restricted ranges stay blocked throughout.

use std::time::Duration;

use imgheal::{HealerConfig, ImageHealer, ImageRecord, IssueKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> HealerConfig {
    HealerConfig {
        allow_loopback: true,
        probe_timeout_ms: Some(2_000),
        chunk_delay_ms: Some(10),
        ..HealerConfig::default()
    }
}

fn test_healer() -> ImageHealer {
    ImageHealer::new(test_config())
}

async fn mount_image(server: &MockServer, route: &str, content_type: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", content_type))
        .mount(server)
        .await;
}

#[derive(Debug, Clone)]
struct Product {
    name: &'static str,
    image_url: Option<String>,
    prior_url: Option<String>,
}

impl Product {
    fn new(name: &'static str, url: Option<&str>) -> Self {
        Self {
            name,
            image_url: url.map(String::from),
            prior_url: None,
        }
    }
}

impl ImageRecord for Product {
    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn set_image_url(&mut self, url: String) {
        if self.image_url.as_deref() != Some(url.as_str()) {
            self.prior_url = self.image_url.take();
        }
        self.image_url = Some(url);
    }

    fn original_image_url(&self) -> Option<&str> {
        self.prior_url.as_deref()
    }
}

#[tokio::test]
async fn valid_image_passes_through_untouched() {
    let server = MockServer::start().await;
    mount_image(&server, "/product.jpg", "image/jpeg").await;

    let url = format!("{}/product.jpg", server.uri());
    let outcome = test_healer().validate_and_heal(Some(&url)).await;

    assert!(outcome.is_valid);
    assert!(!outcome.was_healed);
    assert_eq!(outcome.url, url);
    assert_eq!(outcome.original_url, None);
}

#[tokio::test]
async fn probe_uses_head_not_get() {
    let server = MockServer::start().await;
    // A GET would hit the failing route; passing proves the probe is HEAD.
    Mock::given(method("GET"))
        .and(path("/verb.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_image(&server, "/verb.jpg", "image/png").await;

    let url = format!("{}/verb.jpg", server.uri());
    let outcome = test_healer().validate_and_heal(Some(&url)).await;
    assert!(!outcome.was_healed);
}

#[tokio::test]
async fn redirects_heal_to_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/moved.jpg"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "https://example.com/new.jpg"),
        )
        .mount(&server)
        .await;

    let healer = test_healer();
    let url = format!("{}/moved.jpg", server.uri());
    let outcome = healer.validate_and_heal(Some(&url)).await;

    assert!(!outcome.is_valid);
    assert!(outcome.was_healed);
    assert_eq!(outcome.url, healer.placeholder_url());
    assert_eq!(outcome.original_url.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn non_image_content_type_heals() {
    let server = MockServer::start().await;
    mount_image(&server, "/page.jpg", "text/html").await;

    let url = format!("{}/page.jpg", server.uri());
    let outcome = test_healer().validate_and_heal(Some(&url)).await;
    assert!(outcome.was_healed);
    assert!(!outcome.is_valid);
}

#[tokio::test]
async fn missing_content_type_heals() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/untyped.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("{}/untyped.jpg", server.uri());
    let outcome = test_healer().validate_and_heal(Some(&url)).await;
    assert!(outcome.was_healed);
}

#[tokio::test]
async fn oversized_declared_length_heals() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/huge.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0_u8; 2048]),
        )
        .mount(&server)
        .await;

    let healer = ImageHealer::new(HealerConfig {
        max_response_bytes: Some(1024),
        ..test_config()
    });
    let url = format!("{}/huge.jpg", server.uri());
    let outcome = healer.validate_and_heal(Some(&url)).await;
    assert!(outcome.was_healed);
    assert!(!outcome.is_valid);
}

#[tokio::test]
async fn error_status_heals() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/gone.jpg", server.uri());
    let outcome = test_healer().validate_and_heal(Some(&url)).await;
    assert!(outcome.was_healed);
}

#[tokio::test]
async fn slow_probe_heals_when_deadline_expires() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/slow.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let url = format!("{}/slow.jpg", server.uri());
    let outcome = test_healer()
        .validate_and_heal_with_timeout(Some(&url), Duration::from_millis(150))
        .await;
    assert!(outcome.was_healed);
    assert!(!outcome.is_valid);
}

#[tokio::test]
async fn resolved_hostname_probe_pins_to_vetted_address() {
    let server = MockServer::start().await;
    mount_image(&server, "/pinned.jpg", "image/webp").await;

    // "localhost" exercises the resolve-then-pin leg: the name is vetted
    // through DNS (loopback answers allowed here) and the connection is
    // pinned to the answering address.
    let url = format!("http://localhost:{}/pinned.jpg", server.address().port());
    let outcome = test_healer().validate_and_heal(Some(&url)).await;

    assert!(!outcome.was_healed, "expected pass, got {outcome:?}");
    assert_eq!(outcome.url, url);
}

#[tokio::test]
async fn unreachable_port_heals() {
    // Nothing listens on the reserved discard port of loopback.
    let outcome = test_healer()
        .validate_and_heal_with_timeout(
            Some("http://127.0.0.1:9/unreachable.jpg"),
            Duration::from_millis(500),
        )
        .await;
    assert!(outcome.was_healed);
}

#[tokio::test]
async fn batch_heals_in_place_preserving_order() {
    let server = MockServer::start().await;
    mount_image(&server, "/ok.jpg", "image/jpeg").await;
    let good = format!("{}/ok.jpg", server.uri());

    let mut items = Vec::new();
    for n in 0..12 {
        let item = match n % 4 {
            0 => Product::new("good", Some(&good)),
            1 => Product::new("internal", Some("http://10.0.0.1/secret.png")),
            2 => Product::new("missing", None),
            _ => Product::new("local", Some("/api/placeholder/300/200")),
        };
        items.push(item);
    }

    let healer = test_healer();
    let healed = healer.heal_many_with_limit(items, 5).await;

    assert_eq!(healed.len(), 12);
    for (n, item) in healed.iter().enumerate() {
        match n % 4 {
            0 => {
                assert_eq!(item.name, "good");
                assert_eq!(item.image_url.as_deref(), Some(good.as_str()));
            }
            1 => {
                assert_eq!(item.name, "internal");
                assert_eq!(item.image_url.as_deref(), Some(healer.placeholder_url()));
            }
            2 => {
                assert_eq!(item.name, "missing");
                assert_eq!(item.image_url.as_deref(), Some(healer.placeholder_url()));
            }
            _ => {
                assert_eq!(item.name, "local");
                assert_eq!(item.image_url.as_deref(), Some("/api/placeholder/300/200"));
            }
        }
    }
}

#[tokio::test]
async fn healed_batch_reports_blocked_records() {
    let server = MockServer::start().await;
    mount_image(&server, "/good.jpg", "image/jpeg").await;
    let good = format!("{}/good.jpg", server.uri());

    let healer = test_healer();
    let items = vec![
        Product::new("metadata", Some("http://169.254.169.254/latest/meta-data/")),
        Product::new("good", Some(&good)),
        Product::new("missing", None),
    ];
    let healed = healer.heal_many(items).await;
    let report = healer.report(&healed);

    assert_eq!(report.total, 3);
    // The metadata record healed away with provenance; the missing one
    // became a placeholder without any.
    assert_eq!(report.stats.blocked, 1);
    assert_eq!(report.stats.valid, 1);
    assert_eq!(report.stats.placeholders, 1);
    assert_eq!(report.stats.missing, 0);

    let blocked_issue = report
        .issues
        .iter()
        .find(|issue| issue.kind == IssueKind::BlockedBySecurity)
        .expect("blocked issue present");
    assert_eq!(
        blocked_issue.url.as_deref(),
        Some("http://169.254.169.254/latest/meta-data/")
    );
}

#[tokio::test]
async fn loopback_exemption_does_not_widen() {
    // Even with the test relaxation on, non-loopback private space blocks.
    let outcome = test_healer()
        .validate_and_heal(Some("http://192.168.1.50/cam.jpg"))
        .await;
    assert!(outcome.was_healed);
    assert!(!outcome.is_valid);
}

#[tokio::test]
async fn self_test_is_green_on_production_config() {
    let healer = ImageHealer::new(HealerConfig::default());
    let report = healer.self_test().await;
    assert!(report.all_passed(), "{report:?}");
}
