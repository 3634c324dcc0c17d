//! Builders for commonly used test data.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{
    AccountType, BankDetails, BusinessProfile, BusinessType, Disbursement, DisbursementGateway,
    DisbursementStatus, Gateway, NewDisbursement, PayableTransaction, Recipient, SettlementMode,
    VerificationFlags, WebhookEndpoint,
};

/// Nigerian individual with a passed BVN check and NGN bank details
#[must_use]
pub fn verified_individual(account_id: &str) -> Recipient {
    Recipient {
        account_id: account_id.to_string(),
        account_type: Some(AccountType::Individual),
        business_type: BusinessType::Other,
        country: "NG".to_string(),
        bank_details: vec![BankDetails {
            currency: "NGN".to_string(),
            bank_code: "058".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Chiamaka Eze".to_string(),
        }],
        verification: VerificationFlags {
            bvn: true,
            ..VerificationFlags::default()
        },
        mobile_money_operator: None,
        phone_number: None,
    }
}

/// Business routing payouts through Rave to bank accounts
#[must_use]
pub fn bank_business(business_id: &str) -> BusinessProfile {
    BusinessProfile {
        business_id: business_id.to_string(),
        disbursement_gateway: DisbursementGateway::Rave,
        settlement_mode: SettlementMode::Bank,
        verification_waived: false,
        disbursement_charge: Decimal::new(5000, 2),
        webhooks: vec![
            WebhookEndpoint {
                event: "disbursement.success".to_string(),
                uri: "https://merchant.example.com/hooks/success".to_string(),
            },
            WebhookEndpoint {
                event: "disbursement.failed".to_string(),
                uri: "https://merchant.example.com/hooks/failed".to_string(),
            },
        ],
    }
}

/// Business settling payouts into recipient wallets
#[must_use]
pub fn wallet_business(business_id: &str) -> BusinessProfile {
    BusinessProfile {
        settlement_mode: SettlementMode::Wallet,
        ..bank_business(business_id)
    }
}

#[must_use]
pub fn payable_transaction(
    transaction_id: &str,
    payment_id: &str,
    business_id: &str,
    recipient_account_id: &str,
    amount: Decimal,
) -> PayableTransaction {
    PayableTransaction {
        transaction_id: transaction_id.to_string(),
        payment_id: payment_id.to_string(),
        business_id: business_id.to_string(),
        recipient_account_id: recipient_account_id.to_string(),
        milestone_id: Some(format!("ms-{}", transaction_id)),
        amount,
        currency: "NGN".to_string(),
        is_paid: true,
    }
}

/// Pending transaction-backed disbursement routed through Rave
#[must_use]
pub fn pending_disbursement(id: &str, payment_id: Option<&str>, amount: Decimal) -> Disbursement {
    NewDisbursement {
        reference: format!("DSB-{}", id),
        recipient_account_id: "acct-1".to_string(),
        business_id: "biz-1".to_string(),
        payment_id: payment_id.map(str::to_string),
        transaction_id: payment_id.map(|_| "tx-1".to_string()),
        milestone_id: payment_id.map(|_| "ms-1".to_string()),
        amount,
        currency: "NGN".to_string(),
        debit_currency: "NGN".to_string(),
        gateway: Gateway::Rave,
        status: DisbursementStatus::Pending,
        fee: Decimal::new(5000, 2),
        payment_released_at: None,
    }
    .into_record(id.to_string(), Utc::now())
}
