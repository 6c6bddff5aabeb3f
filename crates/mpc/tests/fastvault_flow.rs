//! Table-driven coverage of the fast-vault coordinator's REST surface against `httptest`,
//! mirroring the `TestCase` style used for the relay/lister tests in the wider corpus.

use httptest::{matchers::*, responders::*, Expectation, Server};
use vultisig_mpc::fastvault::{FastVaultClient, ReshareRequest, SignRequest};

struct TestCase {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    status: u16,
}

#[tokio::test]
async fn requests_surface_non_success_statuses_as_errors() {
    let test_cases = vec![
        TestCase { name: "sign rejected", method: "POST", path: "/sign", status: 400 },
        TestCase { name: "reshare server error", method: "POST", path: "/reshare", status: 500 },
    ];

    for tc in test_cases {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(tc.method, tc.path)).respond_with(status_code(tc.status)),
        );
        let client = FastVaultClient::new(server.url_str("").trim_end_matches('/').to_string());

        let result = match tc.path {
            "/sign" => {
                client
                    .sign(&SignRequest {
                        public_key: "03ab",
                        messages: &["deadbeef".to_string()],
                        session: "AAAA",
                        hex_encryption_key: "24",
                        derive_path: "m/44'/60'/0'/0/0",
                        is_ecdsa: true,
                        vault_password: "hunter2",
                    })
                    .await
            }
            "/reshare" => {
                client
                    .reshare(&ReshareRequest {
                        name: "My Vault",
                        session_id: "AAAA",
                        public_key: "03ab",
                        hex_encryption_key: "24",
                        hex_chain_code: "11",
                        local_party_id: "browser-AAAA",
                        old_parties: &["browser-AAAA".to_string(), "Server-1111".to_string()],
                        old_reshare_prefix: "r-",
                        encryption_password: "hunter2",
                        email: Some("user@example.com"),
                        reshare_type: "ECDSA",
                        lib_type: 1,
                    })
                    .await
            }
            _ => unreachable!(),
        };

        assert!(result.is_err(), "test case '{}' expected an error", tc.name);
    }
}

#[tokio::test]
async fn resend_verification_succeeds_on_200() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/resend-verification/03ab")).respond_with(status_code(200)),
    );
    let client = FastVaultClient::new(server.url_str("").trim_end_matches('/').to_string());
    client.resend_verification("03ab").await.unwrap();
}
