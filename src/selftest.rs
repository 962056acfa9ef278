//! Adversarial self-test for the validation pipeline.
//!
//! Drives a fixed vector table through the admission decision and checks
//! the expected block/allow outcome per case. Every vector short-circuits
//! before network I/O (literal addresses, scheme and parse failures, the
//! allowlist hit, the local placeholder), so the harness is deterministic
//! and safe to wire into a health endpoint.
//!
//! Run it against the production configuration: relaxations such as
//! `allow_loopback` legitimately change the loopback verdicts.

use serde::Serialize;

use crate::{Admission, ImageHealer};

struct Vector {
    url: &'static str,
    expect_block: bool,
    what: &'static str,
}

const VECTORS: &[Vector] = &[
    Vector {
        url: "http://127.0.0.1/test",
        expect_block: true,
        what: "IPv4 loopback",
    },
    Vector {
        url: "http://10.0.0.1/test",
        expect_block: true,
        what: "RFC1918 10.0.0.0/8",
    },
    Vector {
        url: "http://192.168.1.1/test",
        expect_block: true,
        what: "RFC1918 192.168.0.0/16",
    },
    Vector {
        url: "http://172.16.1.1/test",
        expect_block: true,
        what: "RFC1918 172.16.0.0/12",
    },
    Vector {
        url: "http://169.254.169.254/latest/meta-data/",
        expect_block: true,
        what: "cloud metadata endpoint",
    },
    Vector {
        url: "http://100.64.0.1/test",
        expect_block: true,
        what: "CGNAT 100.64.0.0/10",
    },
    Vector {
        url: "http://[::1]/test",
        expect_block: true,
        what: "IPv6 loopback",
    },
    Vector {
        url: "file:///etc/passwd",
        expect_block: true,
        what: "file scheme",
    },
    Vector {
        url: "ftp://example.com/test",
        expect_block: true,
        what: "ftp scheme",
    },
    Vector {
        url: "data:image/png;base64,iVBORw0KGgo=",
        expect_block: true,
        what: "data scheme",
    },
    Vector {
        url: "not-a-url",
        expect_block: true,
        what: "malformed URL",
    },
    Vector {
        url: "https://evil.test/placeholder.png",
        expect_block: true,
        what: "spoofed placeholder",
    },
    Vector {
        url: "https://via.placeholder.com/300x200",
        expect_block: false,
        what: "trusted CDN host",
    },
    Vector {
        url: "/api/placeholder/300/200",
        expect_block: false,
        what: "local placeholder",
    },
];

/// Aggregate self-test outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestReport {
    pub passed: usize,
    pub failed: usize,
    pub details: Vec<SelfTestCase>,
}

impl SelfTestReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// One vector's verdict.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestCase {
    /// What the vector exercises.
    pub test: String,
    pub url: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub(crate) async fn run(healer: &ImageHealer) -> SelfTestReport {
    let mut report = SelfTestReport {
        passed: 0,
        failed: 0,
        details: Vec::with_capacity(VECTORS.len()),
    };

    for vector in VECTORS {
        let admission = healer.admit(Some(vector.url)).await;
        let blocked = matches!(admission, Admission::Denied { .. });
        let passed = blocked == vector.expect_block;
        let reason = (!passed).then(|| {
            if vector.expect_block {
                "expected block, candidate was admitted".to_string()
            } else {
                "expected allow, candidate was blocked".to_string()
            }
        });
        if passed {
            report.passed += 1;
        } else {
            report.failed += 1;
            tracing::warn!(url = vector.url, what = vector.what, "self-test vector failed");
        }
        report.details.push(SelfTestCase {
            test: vector.what.to_string(),
            url: vector.url.to_string(),
            passed,
            reason,
        });
    }
    report
}
