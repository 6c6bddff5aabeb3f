//! End-to-end exercise of the session runtime against a real HTTP relay (backed by
//! `httptest`), for the degenerate single-party case: no peer round-trip, but every relay
//! endpoint the runtime calls (join, parties, start, setup-message upload/download, complete)
//! has to respond correctly for the session to reach a terminal state.

use std::time::Duration;

use httptest::{matchers::*, responders::*, Expectation, Server};
use vultisig_core::crypto::SignatureAlgorithm;
use vultisig_core::test_utils::MockKernel;
use vultisig_mpc::relay::HttpRelayClient;
use vultisig_mpc::session::{run_keygen, CancellationToken, SessionContext};

#[tokio::test]
async fn a_single_party_keygen_session_completes_through_a_real_http_relay() {
    let server = Server::run();

    server.expect(
        Expectation::matching(request::method_path("POST", "/solo-session"))
            .respond_with(status_code(201)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/solo-session"))
            .respond_with(json_encoded(serde_json::json!(["solo"]))),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", "/start/solo-session"))
            .respond_with(status_code(201)),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", "/setup-message/solo-session"))
            .respond_with(status_code(201)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/setup-message/solo-session"))
            .respond_with(status_code(200).body("keygen:-:1:solo")),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", "/complete/solo-session"))
            .respond_with(status_code(201)),
    );

    let relay = HttpRelayClient::new(server.url_str("").trim_end_matches('/').to_string());
    let kernel = MockKernel::new(SignatureAlgorithm::ECDSA, 7);
    let (progress, _rx) = vultisig_mpc::progress_channel(16);

    let ctx = SessionContext {
        session_id: "solo-session".to_string(),
        local_party_id: "solo".to_string(),
        party_ids: vec!["solo".to_string()],
        encryption_key: [0x11u8; 32],
        max_retries: 3,
        poll_interval: Duration::from_millis(1),
        peer_join_timeout: Duration::from_millis(200),
        cancellation: CancellationToken::new(),
    };

    let share = run_keygen(&relay, &kernel, &ctx, &progress, None, 1).await.unwrap();
    assert_eq!(share.algo(), SignatureAlgorithm::ECDSA);
    assert_eq!(share.public_key().algo, SignatureAlgorithm::ECDSA);
}
