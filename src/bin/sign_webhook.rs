//! Prints a signed sample webhook as a curl command.
//!
//! Usage: sign_webhook [--monnify] [--failed] <reference> [amount]
//!
//! The secret comes from `GATEWAY_WEBHOOK_SECRET`, or `MONNIFY_WEBHOOK_SECRET`
//! with `--monnify`. `SERVER_URL` overrides `http://localhost:3000`.

use escrow_disbursement_engine::api::{GATEWAY_SIGNATURE_HEADER, MONNIFY_SIGNATURE_HEADER};
use escrow_disbursement_engine::infra::signature;
use serde_json::json;

fn main() {
    dotenvy::dotenv().ok();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let monnify = args.iter().any(|a| a == "--monnify");
    let failed = args.iter().any(|a| a == "--failed");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let Some(reference) = positional.first() else {
        eprintln!("usage: sign_webhook [--monnify] [--failed] <reference> [amount]");
        std::process::exit(2);
    };
    let amount = positional.get(1).map_or("1000.00", |a| a.as_str());

    let secret_var = if monnify {
        "MONNIFY_WEBHOOK_SECRET"
    } else {
        "GATEWAY_WEBHOOK_SECRET"
    };
    let secret = std::env::var(secret_var).unwrap_or_else(|_| {
        eprintln!("{} not set, signing with \"dev-secret\"", secret_var);
        "dev-secret".to_string()
    });
    let server = std::env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:3000".into());

    let (path, header, body) = if monnify {
        let event = if failed {
            "FAILED_DISBURSEMENT"
        } else {
            "SUCCESSFUL_DISBURSEMENT"
        };
        let body = json!({
            "eventType": event,
            "eventData": {
                "reference": reference,
                "amount": amount,
                "status": if failed { "FAILED" } else { "SUCCESS" },
                "transactionDescription": "sample callback",
            }
        });
        ("/webhooks/monnify/disbursement", MONNIFY_SIGNATURE_HEADER, body)
    } else {
        let body = json!({
            "event": "transfer.completed",
            "data": {
                "reference": reference,
                "status": if failed { "FAILED" } else { "SUCCESSFUL" },
            }
        });
        ("/webhooks/gateway/rave", GATEWAY_SIGNATURE_HEADER, body)
    };

    let body = body.to_string();
    let sig = signature::sign(secret.as_bytes(), body.as_bytes());

    println!(
        "curl -X POST '{}{}' \\\n  -H 'Content-Type: application/json' \\\n  -H '{}: {}' \\\n  -d '{}'",
        server, path, header, sig, body
    );
}
