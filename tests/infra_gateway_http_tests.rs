//! HTTP-based integration tests for the gateway and service clients.
//!
//! Uses `wiremock` to stand in for Rave, Monnify, the sibling platform
//! services and merchant webhook endpoints.

use std::time::Duration;

use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, header_exists, method, path, query_param},
};

use escrow_disbursement_engine::domain::{
    AppError, Destination, ExternalServiceError, GatewayClient, GatewayError, TransferInstruction,
    TransferState,
};

fn bank_instruction(reference: &str) -> TransferInstruction {
    TransferInstruction {
        reference: reference.to_string(),
        amount: dec!(1500.00),
        currency: "NGN".to_string(),
        debit_currency: "NGN".to_string(),
        destination: Destination::Bank {
            bank_code: "058".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Chiamaka Eze".to_string(),
        },
        narration: "Milestone payout".to_string(),
    }
}

// ============================================================================
// RAVE GATEWAY TESTS
// ============================================================================

mod rave_tests {
    use super::*;
    use escrow_disbursement_engine::infra::{RaveConfig, RaveGateway};

    fn gateway(server: &MockServer) -> RaveGateway {
        RaveGateway::new(RaveConfig::new(SecretString::from("FLWSECK-test")).with_base_url(server.uri()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_transfer_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/transfers"))
            .and(header("Authorization", "Bearer FLWSECK-test"))
            .and(body_partial_json(json!({
                "account_bank": "058",
                "account_number": "0123456789",
                "reference": "DSB-1",
                "currency": "NGN"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Transfer Queued Successfully",
                "data": {
                    "id": 190626,
                    "reference": "DSB-1",
                    "status": "NEW",
                    "fee": 10.75,
                    "amount": 1500
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = gateway(&server)
            .initiate_transfer(&bank_instruction("DSB-1"))
            .await
            .unwrap();

        assert_eq!(receipt.reference, "DSB-1");
        assert_eq!(receipt.gateway_reference.as_deref(), Some("190626"));
        assert_eq!(receipt.fee, Some(dec!(10.75)));
        assert_eq!(receipt.request["beneficiary_name"], "Chiamaka Eze");
    }

    #[tokio::test]
    async fn test_initiate_transfer_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/transfers"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "message": "Insufficient balance"
            })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .initiate_transfer(&bank_instruction("DSB-1"))
            .await;

        assert!(matches!(
            result,
            Err(AppError::Gateway(GatewayError::Rejected { status_code: 400, .. }))
        ));
    }

    #[tokio::test]
    async fn test_initiate_transfer_error_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/transfers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "message": "Account resolve failed",
                "data": null
            })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .initiate_transfer(&bank_instruction("DSB-1"))
            .await;

        match result {
            Err(AppError::Gateway(GatewayError::Rejected { message, .. })) => {
                assert_eq!(message, "Account resolve failed");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_status_by_reference() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/transfers"))
            .and(query_param("reference", "DSB-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Transfers fetched",
                "data": [
                    { "id": 190626, "reference": "DSB-1", "status": "SUCCESSFUL", "amount": 1500 }
                ]
            })))
            .mount(&server)
            .await;

        let status = gateway(&server).query_status("DSB-1").await.unwrap();

        assert_eq!(status.state, TransferState::Completed);
        assert_eq!(status.raw_status, "SUCCESSFUL");
        assert_eq!(status.amount, Some(dec!(1500)));
    }

    #[tokio::test]
    async fn test_query_status_empty_list_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/transfers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Transfers fetched",
                "data": []
            })))
            .mount(&server)
            .await;

        let result = gateway(&server).query_status("DSB-404").await;

        assert!(matches!(
            result,
            Err(AppError::Gateway(GatewayError::TransferNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_health_check_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/balances"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(gateway(&server).health_check().await.is_err());
    }
}

// ============================================================================
// MONNIFY GATEWAY TESTS
// ============================================================================

mod monnify_tests {
    use super::*;
    use escrow_disbursement_engine::infra::{MonnifyConfig, MonnifyGateway};

    fn gateway(server: &MockServer) -> MonnifyGateway {
        MonnifyGateway::new(MonnifyConfig {
            base_url: server.uri(),
            api_key: SecretString::from("MK_TEST"),
            secret_key: SecretString::from("SK_TEST"),
            contract_code: "7059707855".to_string(),
            source_account: "3934178936".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestSuccessful": true,
                "responseMessage": "success",
                "responseBody": { "accessToken": "token-abc", "expiresIn": 3600 }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_token_is_reused() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/v2/disbursements/single"))
            .and(header("Authorization", "Bearer token-abc"))
            .and(body_partial_json(json!({
                "reference": "DSB-1",
                "destinationBankCode": "058",
                "sourceAccountNumber": "3934178936"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestSuccessful": true,
                "responseMessage": "success",
                "responseBody": {
                    "reference": "DSB-1",
                    "status": "SUCCESS",
                    "totalFee": 35,
                    "amount": 1500
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v2/disbursements/single/summary"))
            .and(query_param("reference", "DSB-1"))
            .and(header("Authorization", "Bearer token-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestSuccessful": true,
                "responseMessage": "success",
                "responseBody": { "reference": "DSB-1", "status": "SUCCESS", "amount": 1500 }
            })))
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        let receipt = gateway
            .initiate_transfer(&bank_instruction("DSB-1"))
            .await
            .unwrap();
        assert_eq!(receipt.fee, Some(dec!(35)));

        let status = gateway.query_status("DSB-1").await.unwrap();
        assert_eq!(status.state, TransferState::Completed);
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_rejected() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/v2/disbursements/single"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestSuccessful": false,
                "responseMessage": "Duplicate reference",
                "responseBody": null
            })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .initiate_transfer(&bank_instruction("DSB-1"))
            .await;

        match result {
            Err(AppError::Gateway(GatewayError::Rejected { message, .. })) => {
                assert_eq!(message, "Duplicate reference");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wallet_destination_not_supported() {
        let server = MockServer::start().await;
        let mut instruction = bank_instruction("DSB-1");
        instruction.destination = Destination::Wallet {
            account_id: "acct-1".to_string(),
        };

        let result = gateway(&server).initiate_transfer(&instruction).await;

        assert!(matches!(result, Err(AppError::NotSupported(_))));
    }
}

// ============================================================================
// SERVICE CLIENT TESTS
// ============================================================================

mod service_client_tests {
    use super::*;
    use escrow_disbursement_engine::domain::{IdentityClient, TransactionClient, TransactionStatus};
    use escrow_disbursement_engine::infra::{
        HttpIdentityClient, HttpTransactionClient, ServiceClientConfig,
    };

    fn config(server: &MockServer) -> ServiceClientConfig {
        ServiceClientConfig::new(server.uri()).with_api_key(SecretString::from("svc-key"))
    }

    #[tokio::test]
    async fn test_get_recipient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts/acct-1"))
            .and(header("x-api-key", "svc-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "account_id": "acct-1",
                "account_type": "individual",
                "country": "NG",
                "bank_details": [{
                    "currency": "NGN",
                    "bank_code": "058",
                    "account_number": "0123456789",
                    "account_name": "Chiamaka Eze"
                }],
                "verification": { "bvn": true },
                "mobile_money_operator": null,
                "phone_number": null
            })))
            .mount(&server)
            .await;

        let client = HttpIdentityClient::new(config(&server)).unwrap();
        let recipient = client.get_recipient("acct-1").await.unwrap();

        assert!(recipient.verification.bvn);
        assert!(recipient.is_nigerian());
        assert!(recipient.bank_details_for("ngn").is_some());
    }

    #[tokio::test]
    async fn test_unknown_business_maps_to_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/businesses/biz-404"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = HttpIdentityClient::new(config(&server)).unwrap();
        let result = client.get_business("biz-404").await;

        assert!(matches!(
            result,
            Err(AppError::ExternalService(ExternalServiceError::ApiError {
                status_code: 404,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/transactions/payable"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = HttpTransactionClient::new(config(&server)).unwrap();
        let result = client.list_payable_transactions(10).await;

        assert!(matches!(
            result,
            Err(AppError::ExternalService(ExternalServiceError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_transaction_updates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/transactions/tx-1/amount-paid"))
            .and(body_partial_json(json!({ "delta": "1500.00" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/transactions/tx-1/status"))
            .and(body_partial_json(json!({ "status": "disbursed" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpTransactionClient::new(config(&server)).unwrap();
        client.add_amount_paid("tx-1", dec!(1500.00)).await.unwrap();
        client
            .update_status("tx-1", TransactionStatus::Disbursed)
            .await
            .unwrap();
    }
}

// ============================================================================
// MERCHANT WEBHOOK SENDER TESTS
// ============================================================================

mod webhook_sender_tests {
    use super::*;
    use escrow_disbursement_engine::domain::WebhookSender;
    use escrow_disbursement_engine::infra::{HttpWebhookSender, signature};

    #[tokio::test]
    async fn test_captures_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hooks"))
            .respond_with(ResponseTemplate::new(500).set_body_string("merchant down"))
            .mount(&server)
            .await;

        let sender = HttpWebhookSender::new(Duration::from_secs(5), None).unwrap();
        let response = sender
            .send(&format!("{}/hooks", server.uri()), "{\"event\":\"x\"}")
            .await
            .unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.body, "merchant down");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_signs_payload_when_secret_set() {
        let server = MockServer::start().await;
        let payload = "{\"event\":\"disbursement.success\"}";

        Mock::given(method("POST"))
            .and(path("/hooks"))
            .and(header(
                "x-escrow-signature",
                signature::sign(b"merchant-secret", payload.as_bytes()).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = HttpWebhookSender::new(
            Duration::from_secs(5),
            Some(SecretString::from("merchant-secret")),
        )
        .unwrap();
        let response = sender
            .send(&format!("{}/hooks", server.uri()), payload)
            .await
            .unwrap();

        assert!(response.is_success());
    }
}
