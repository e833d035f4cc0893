//! Voucher Sequence Module
//!
//! Derives the next cash-book voucher number for a branch and transaction
//! type from the most recently created voucher of that kind.
//!
//! The read-then-increment is not serialized: two concurrent callers for the
//! same branch and type can receive the same number. Callers persist the
//! returned number themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::backend::{DataService, Select};
use crate::error::{AppError, Result};

/// Table holding cash-book transactions.
pub const CASH_TABLE: &str = "cash_transactions";

/// Minimum number of digits in a voucher number.
pub const SEQUENCE_WIDTH: usize = 3;

// == Voucher Type ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    /// Payment voucher, prefix `P`
    CashOut,
    /// Receipt voucher, prefix `R`
    CashIn,
}

impl VoucherType {
    pub fn prefix(&self) -> &'static str {
        match self {
            VoucherType::CashOut => "P",
            VoucherType::CashIn => "R",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherType::CashOut => "cash_out",
            VoucherType::CashIn => "cash_in",
        }
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoucherType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cash_out" => Ok(VoucherType::CashOut),
            "cash_in" => Ok(VoucherType::CashIn),
            other => Err(AppError::Validation(format!(
                "Invalid voucher type '{}': expected cash_out or cash_in",
                other
            ))),
        }
    }
}

// == Voucher ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voucher {
    pub voucher_no: String,
    #[serde(rename = "type")]
    pub voucher_type: VoucherType,
}

/// Formats a sequence number with the type prefix, e.g. `P007`.
pub fn format_voucher(voucher_type: VoucherType, sequence: u64) -> String {
    format!(
        "{}{:0width$}",
        voucher_type.prefix(),
        sequence,
        width = SEQUENCE_WIDTH
    )
}

/// Parses the numeric suffix of a stored voucher number.
pub fn parse_sequence(voucher_type: VoucherType, voucher_no: &str) -> Option<u64> {
    let digits = voucher_no.strip_prefix(voucher_type.prefix())?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// == Generate ==
/// Returns the next voucher number for `branch` and `voucher_type`.
///
/// Always reads the backend directly; cached values are never trusted here.
pub async fn generate_voucher(
    service: &dyn DataService,
    branch: &str,
    voucher_type: VoucherType,
) -> Result<Voucher> {
    let branch = branch.trim();
    if branch.is_empty() {
        return Err(AppError::Validation("Branch is required".to_string()));
    }

    let query = Select::from(CASH_TABLE)
        .eq("branch", branch)
        .starts_with("voucher_no", voucher_type.prefix())
        .order_by("created_at", true)
        .limit(1);

    let rows = service.select(&query).await?;

    let next = match rows.first() {
        None => 1,
        Some(row) => {
            let last = row.get("voucher_no").and_then(Value::as_str).unwrap_or("");
            let sequence = parse_sequence(voucher_type, last).ok_or_else(|| {
                error!(branch, voucher_no = last, "Stored voucher number is not numeric");
                AppError::Internal(format!(
                    "Cannot continue sequence from voucher '{}'",
                    last
                ))
            })?;
            sequence.checked_add(1).ok_or_else(|| {
                error!(branch, voucher_no = last, "Voucher sequence exhausted");
                AppError::Internal(format!("Voucher sequence exhausted after '{}'", last))
            })?
        }
    };

    let voucher_no = format_voucher(voucher_type, next);
    debug!(branch, %voucher_type, %voucher_no, "Generated voucher number");

    Ok(Voucher {
        voucher_no,
        voucher_type,
    })
}
