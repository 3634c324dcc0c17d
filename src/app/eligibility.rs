//! Pre-disbursement eligibility screening.
//!
//! Two independent lists come out of an evaluation:
//! - `restricted`: KYC and routing gaps on the recipient, waivable per business
//! - `issues`: hard blockers on the payment itself, never waived

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountType, BusinessProfile, BusinessType, DisbursementGateway, FailedDisbursement,
    PayableTransaction, Recipient,
};

/// Mobile-money operators the transfer gateway can route to
pub const SUPPORTED_MOBILE_MONEY_OPERATORS: &[&str] = &["MTN", "VODAFONE", "TIGO", "AIRTEL", "MPESA"];

/// Recipient-side reason a payout is held back
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    AccountTypeMissing,
    BvnUnverified,
    IdUnverified,
    CacUnverified,
    UtilityBillUnverified,
    MobileMoneyOperatorMissing,
}

impl Restriction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountTypeMissing => "account_type_missing",
            Self::BvnUnverified => "bvn_unverified",
            Self::IdUnverified => "id_unverified",
            Self::CacUnverified => "cac_unverified",
            Self::UtilityBillUnverified => "utility_bill_unverified",
            Self::MobileMoneyOperatorMissing => "mobile_money_operator_missing",
        }
    }
}

/// Payment-side reason a payout cannot proceed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    NotPaid,
    MissingBankDetails,
}

impl Issue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPaid => "not_paid",
            Self::MissingBankDetails => "missing_bank_details",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityReport {
    pub restricted: Vec<Restriction>,
    pub issues: Vec<Issue>,
}

impl EligibilityReport {
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.restricted.is_empty() && self.issues.is_empty()
    }

    /// Row recorded against the payment when the report is not eligible
    #[must_use]
    pub fn to_failed_disbursement(&self, transaction: &PayableTransaction) -> FailedDisbursement {
        FailedDisbursement {
            payment_id: transaction.payment_id.clone(),
            transaction_id: transaction.transaction_id.clone(),
            business_id: transaction.business_id.clone(),
            restricted: self
                .restricted
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            issues: self.issues.iter().map(|i| i.as_str().to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    /// Human-readable summary for alerts
    #[must_use]
    pub fn summary(&self) -> String {
        let restricted: Vec<&str> = self.restricted.iter().map(Restriction::as_str).collect();
        let issues: Vec<&str> = self.issues.iter().map(Issue::as_str).collect();
        format!(
            "restricted=[{}] issues=[{}]",
            restricted.join(", "),
            issues.join(", ")
        )
    }
}

/// Stateless evaluator; every check runs regardless of earlier failures
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    #[must_use]
    pub fn evaluate(
        &self,
        transaction: &PayableTransaction,
        recipient: &Recipient,
        business: &BusinessProfile,
    ) -> EligibilityReport {
        let mut report = EligibilityReport::default();

        if !transaction.is_paid {
            report.issues.push(Issue::NotPaid);
        }

        if recipient.bank_details_for(&transaction.currency).is_none() {
            report.issues.push(Issue::MissingBankDetails);
        }

        match recipient.account_type {
            None => report.restricted.push(Restriction::AccountTypeMissing),
            Some(AccountType::Individual) if recipient.is_nigerian() => {
                if !recipient.verification.bvn {
                    report.restricted.push(Restriction::BvnUnverified);
                }
            }
            Some(AccountType::Business) if recipient.is_nigerian() => {
                match recipient.business_type {
                    BusinessType::SocialCommerce => {
                        if !recipient.verification.id_document {
                            report.restricted.push(Restriction::IdUnverified);
                        }
                    }
                    BusinessType::Other => {
                        if !recipient.verification.cac {
                            report.restricted.push(Restriction::CacUnverified);
                        }
                        if !recipient.verification.utility_bill {
                            report.restricted.push(Restriction::UtilityBillUnverified);
                        }
                    }
                }
            }
            Some(_) => {}
        }

        if business.disbursement_gateway == DisbursementGateway::MobileMoney
            && !has_supported_operator(recipient)
        {
            report.restricted.push(Restriction::MobileMoneyOperatorMissing);
        }

        if business.verification_waived {
            report.restricted.clear();
        }

        report
    }
}

fn has_supported_operator(recipient: &Recipient) -> bool {
    let Some(operator) = recipient.mobile_money_operator.as_deref() else {
        return false;
    };
    let has_phone = recipient
        .phone_number
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    has_phone
        && SUPPORTED_MOBILE_MONEY_OPERATORS
            .iter()
            .any(|o| o.eq_ignore_ascii_case(operator.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        bank_business, payable_transaction, verified_individual, wallet_business,
    };
    use rust_decimal_macros::dec;

    fn tx() -> PayableTransaction {
        payable_transaction("tx-1", "pay-1", "biz-1", "acct-1", dec!(1000))
    }

    #[test]
    fn test_verified_individual_is_eligible() {
        let report = EligibilityEvaluator.evaluate(
            &tx(),
            &verified_individual("acct-1"),
            &bank_business("biz-1"),
        );
        assert!(report.is_eligible(), "{}", report.summary());
    }

    #[test]
    fn test_checks_accumulate() {
        let mut recipient = verified_individual("acct-1");
        recipient.verification.bvn = false;
        recipient.bank_details.clear();
        let mut transaction = tx();
        transaction.is_paid = false;

        let report = EligibilityEvaluator.evaluate(&transaction, &recipient, &bank_business("biz-1"));
        assert_eq!(report.restricted, vec![Restriction::BvnUnverified]);
        assert_eq!(report.issues, vec![Issue::NotPaid, Issue::MissingBankDetails]);
    }

    #[test]
    fn test_missing_account_type_is_restricted() {
        let mut recipient = verified_individual("acct-1");
        recipient.account_type = None;
        let report = EligibilityEvaluator.evaluate(&tx(), &recipient, &bank_business("biz-1"));
        assert_eq!(report.restricted, vec![Restriction::AccountTypeMissing]);
    }

    #[test]
    fn test_nigerian_business_requirements_by_type() {
        let mut recipient = verified_individual("acct-1");
        recipient.account_type = Some(AccountType::Business);
        recipient.business_type = BusinessType::SocialCommerce;
        let business = bank_business("biz-1");

        let report = EligibilityEvaluator.evaluate(&tx(), &recipient, &business);
        assert_eq!(report.restricted, vec![Restriction::IdUnverified]);

        recipient.business_type = BusinessType::Other;
        recipient.verification.cac = true;
        let report = EligibilityEvaluator.evaluate(&tx(), &recipient, &business);
        assert_eq!(report.restricted, vec![Restriction::UtilityBillUnverified]);
    }

    #[test]
    fn test_foreign_individual_skips_bvn() {
        let mut recipient = verified_individual("acct-1");
        recipient.country = "GH".into();
        recipient.verification.bvn = false;
        let report = EligibilityEvaluator.evaluate(&tx(), &recipient, &bank_business("biz-1"));
        assert!(report.is_eligible());
    }

    #[test]
    fn test_mobile_money_requires_supported_operator() {
        let mut business = bank_business("biz-1");
        business.disbursement_gateway = DisbursementGateway::MobileMoney;
        let mut recipient = verified_individual("acct-1");

        let report = EligibilityEvaluator.evaluate(&tx(), &recipient, &business);
        assert_eq!(report.restricted, vec![Restriction::MobileMoneyOperatorMissing]);
        assert!(report.issues.is_empty());

        recipient.mobile_money_operator = Some("mtn".into());
        recipient.phone_number = Some("+233200000000".into());
        let report = EligibilityEvaluator.evaluate(&tx(), &recipient, &business);
        assert!(report.is_eligible());
    }

    #[test]
    fn test_wallet_settlement_still_requires_bank_details() {
        let mut recipient = verified_individual("acct-1");
        recipient.bank_details.clear();
        let report =
            EligibilityEvaluator.evaluate(&tx(), &recipient, &wallet_business("biz-1"));
        assert_eq!(report.issues, vec![Issue::MissingBankDetails]);
        assert!(!report.is_eligible());
    }

    #[test]
    fn test_waiver_clears_restricted_but_not_issues() {
        let mut business = bank_business("biz-1");
        business.verification_waived = true;
        let mut recipient = verified_individual("acct-1");
        recipient.account_type = None;
        let mut transaction = tx();
        transaction.is_paid = false;

        let report = EligibilityEvaluator.evaluate(&transaction, &recipient, &business);
        assert!(report.restricted.is_empty());
        assert_eq!(report.issues, vec![Issue::NotPaid]);
        assert!(!report.is_eligible());
    }

    #[test]
    fn test_failed_disbursement_keeps_lists_distinct() {
        let report = EligibilityReport {
            restricted: vec![Restriction::BvnUnverified],
            issues: vec![Issue::MissingBankDetails],
        };
        let row = report.to_failed_disbursement(&tx());
        assert_eq!(row.payment_id, "pay-1");
        assert_eq!(row.restricted, vec!["bvn_unverified"]);
        assert_eq!(row.issues, vec!["missing_bank_details"]);
    }
}
