//! Document kinds and the enums every document shares

use serde::{Deserialize, Serialize};

/// Kinds of business documents that flow through the creation pipeline.
///
/// The string form doubles as the URL segment and the `reference_kind`
/// recorded on postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Sales,
    SalesReturn,
    Purchase,
    PurchaseReturn,
    Quotation,
    QuotationSalesReturn,
    SalesPayment,
    PurchasePayment,
    Capital,
    CapitalWithdrawal,
    Dividend,
    Expense,
    CustomerDeposit,
    CustomerWithdrawal,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Sales => "sales",
            DocumentKind::SalesReturn => "sales-return",
            DocumentKind::Purchase => "purchase",
            DocumentKind::PurchaseReturn => "purchase-return",
            DocumentKind::Quotation => "quotation",
            DocumentKind::QuotationSalesReturn => "quotation-sales-return",
            DocumentKind::SalesPayment => "sales-payment",
            DocumentKind::PurchasePayment => "purchase-payment",
            DocumentKind::Capital => "capital",
            DocumentKind::CapitalWithdrawal => "capital-withdrawal",
            DocumentKind::Dividend => "dividend",
            DocumentKind::Expense => "expense",
            DocumentKind::CustomerDeposit => "customer-deposit",
            DocumentKind::CustomerWithdrawal => "customer-withdrawal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sales" => Some(DocumentKind::Sales),
            "sales-return" => Some(DocumentKind::SalesReturn),
            "purchase" => Some(DocumentKind::Purchase),
            "purchase-return" => Some(DocumentKind::PurchaseReturn),
            "quotation" => Some(DocumentKind::Quotation),
            "quotation-sales-return" => Some(DocumentKind::QuotationSalesReturn),
            "sales-payment" => Some(DocumentKind::SalesPayment),
            "purchase-payment" => Some(DocumentKind::PurchasePayment),
            "capital" => Some(DocumentKind::Capital),
            "capital-withdrawal" => Some(DocumentKind::CapitalWithdrawal),
            "dividend" => Some(DocumentKind::Dividend),
            "expense" => Some(DocumentKind::Expense),
            "customer-deposit" => Some(DocumentKind::CustomerDeposit),
            "customer-withdrawal" => Some(DocumentKind::CustomerWithdrawal),
        _ => None,
        }
    }

    /// Default serial prefix for the kind, used when a store has not
    /// configured a template.
    pub fn serial_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Sales => "INV",
            DocumentKind::SalesReturn => "SRN",
            DocumentKind::Purchase => "PUR",
            DocumentKind::PurchaseReturn => "PRN",
            DocumentKind::Quotation => "QTN",
            DocumentKind::QuotationSalesReturn => "QSR",
            DocumentKind::SalesPayment => "SPM",
            DocumentKind::PurchasePayment => "PPM",
            DocumentKind::Capital => "CAP",
            DocumentKind::CapitalWithdrawal => "CPW",
            DocumentKind::Dividend => "DIV",
            DocumentKind::Expense => "EXP",
            DocumentKind::CustomerDeposit => "CDP",
            DocumentKind::CustomerWithdrawal => "CWD",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a document is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Bank,
    CustomerAccount,
    VendorAccount,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Bank => "bank",
            PaymentMethod::CustomerAccount => "customer_account",
            PaymentMethod::VendorAccount => "vendor_account",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cash" => Some(PaymentMethod::Cash),
            "bank" => Some(PaymentMethod::Bank),
            "customer_account" => Some(PaymentMethod::CustomerAccount),
            "vendor_account" => Some(PaymentMethod::VendorAccount),
            _ => None,
        }
    }

    /// Settlement through a counterparty account rather than cash or bank.
    pub fn is_on_account(&self) -> bool {
        matches!(
            self,
            PaymentMethod::CustomerAccount | PaymentMethod::VendorAccount
        )
    }
}

/// Payment state of an invoice-like document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    NotPaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::NotPaid => "not_paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "paid" => Some(PaymentStatus::Paid),
            "partial" => Some(PaymentStatus::Partial),
            "not_paid" => Some(PaymentStatus::NotPaid),
            _ => None,
        }
    }

    /// Derive the status from the document total and the sum of live
    /// payments against it.
    pub fn derive(total: rust_decimal::Decimal, paid: rust_decimal::Decimal) -> Self {
        if paid <= rust_decimal::Decimal::ZERO {
            PaymentStatus::NotPaid
        } else if paid >= total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        }
    }
}

/// Outcome of reporting a document to the tax authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingStatus {
    Pending,
    Passed,
    Failed,
}

impl ReportingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportingStatus::Pending => "pending",
            ReportingStatus::Passed => "passed",
            ReportingStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReportingStatus::Pending),
            "passed" => Some(ReportingStatus::Passed),
            "failed" => Some(ReportingStatus::Failed),
            _ => None,
        }
    }
}

/// Whether a new document may be created in a reported series.
///
/// The series stays closed while the most recent document has not been
/// reported successfully.
pub fn series_open(previous: Option<ReportingStatus>) -> bool {
    match previous {
        None | Some(ReportingStatus::Passed) => true,
        Some(ReportingStatus::Pending) | Some(ReportingStatus::Failed) => false,
    }
}

/// A quotation either stays a quote or is issued as an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationType {
    Quotation,
    Invoice,
}

impl QuotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationType::Quotation => "quotation",
            QuotationType::Invoice => "invoice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quotation" => Some(QuotationType::Quotation),
            "invoice" => Some(QuotationType::Invoice),
            _ => None,
        }
    }
}

/// Simple amount-driven documents that share one creation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoucherKind {
    Capital,
    CapitalWithdrawal,
    Dividend,
    Expense,
    CustomerDeposit,
    CustomerWithdrawal,
}

impl VoucherKind {
    pub fn document_kind(&self) -> DocumentKind {
        match self {
            VoucherKind::Capital => DocumentKind::Capital,
            VoucherKind::CapitalWithdrawal => DocumentKind::CapitalWithdrawal,
            VoucherKind::Dividend => DocumentKind::Dividend,
            VoucherKind::Expense => DocumentKind::Expense,
            VoucherKind::CustomerDeposit => DocumentKind::CustomerDeposit,
            VoucherKind::CustomerWithdrawal => DocumentKind::CustomerWithdrawal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.document_kind().as_str()
    }

    pub fn parse(value: &str) -> Option<Self> {
        match DocumentKind::parse(value)? {
            DocumentKind::Capital => Some(VoucherKind::Capital),
            DocumentKind::CapitalWithdrawal => Some(VoucherKind::CapitalWithdrawal),
            DocumentKind::Dividend => Some(VoucherKind::Dividend),
            DocumentKind::Expense => Some(VoucherKind::Expense),
            DocumentKind::CustomerDeposit => Some(VoucherKind::CustomerDeposit),
            DocumentKind::CustomerWithdrawal => Some(VoucherKind::CustomerWithdrawal),
            _ => None,
        }
    }
}
