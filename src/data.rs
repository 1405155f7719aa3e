//! Transaction CSV loading using Polars

use polars::prelude::*;
use std::path::Path;

use crate::error::SegmentationError;
use crate::transaction::RawTransaction;

/// Columns every input file must carry
const REQUIRED_COLUMNS: [&str; 4] = ["customer_id", "date", "amount", "category"];

/// Load transaction rows from a CSV file.
///
/// Every column is read as text; typing and validation happen later in
/// [`crate::transaction::Transaction::parse`] so malformed values are reported
/// with the offending row instead of failing the whole read.
///
/// # Arguments
/// * `file_path` - Path to a CSV file with the columns
///   `customer_id, date, description, amount, transaction_type, category, account_name`
///   (`description`, `transaction_type` and `account_name` may be absent)
pub fn load_transactions(file_path: impl AsRef<Path>) -> crate::Result<Vec<RawTransaction>> {
    let file_path = file_path.as_ref();
    log::info!("Loading transactions from {}", file_path.display());

    let df = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .collect()?;

    let rows = raw_transactions_from_frame(&df)?;
    log::debug!("Read {} transaction rows", rows.len());
    Ok(rows)
}

/// Convert an already loaded frame into raw transaction rows.
pub fn raw_transactions_from_frame(df: &DataFrame) -> crate::Result<Vec<RawTransaction>> {
    for required in REQUIRED_COLUMNS {
        if find_column(df, required).is_none() {
            return Err(SegmentationError::invalid(
                "input header",
                required,
                "column is missing",
            ));
        }
    }

    let height = df.height();
    let customer_id = text_column(df, "customer_id", height)?;
    let date = text_column(df, "date", height)?;
    let description = text_column(df, "description", height)?;
    let amount = text_column(df, "amount", height)?;
    let transaction_type = text_column(df, "transaction_type", height)?;
    let category = text_column(df, "category", height)?;
    let account_name = text_column(df, "account_name", height)?;

    let rows = (0..height)
        .map(|i| RawTransaction {
            customer_id: customer_id[i].clone(),
            date: date[i].clone(),
            description: description[i].clone(),
            amount: amount[i].clone(),
            transaction_type: transaction_type[i].clone(),
            category: category[i].clone(),
            account_name: account_name[i].clone(),
        })
        .collect();

    Ok(rows)
}

/// Header lookup tolerant of case and surrounding whitespace
fn find_column<'a>(df: &'a DataFrame, name: &str) -> Option<&'a str> {
    df.get_column_names()
        .into_iter()
        .find(|column| column.trim().eq_ignore_ascii_case(name))
}

/// Column values as strings; an absent optional column yields empty strings
fn text_column(df: &DataFrame, name: &str, height: usize) -> crate::Result<Vec<String>> {
    let Some(actual) = find_column(df, name) else {
        return Ok(vec![String::new(); height]);
    };

    let series = df.column(actual)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "date,description,amount,transaction_type,category,account_name,customer_id").unwrap();
        writeln!(file, "2024-01-31,PAYCHECK - ABC CORP,4500.00,credit,Income,Checking,C001").unwrap();
        writeln!(file, "2024-01-03,RENT PAYMENT,-1800.00,debit,Mortgage & Rent,Checking,C001").unwrap();
        writeln!(file, "2024-01-09,STARBUCKS #453,-5.50,debit,Coffee Shops,Credit Card,C001").unwrap();
        writeln!(file, "2024-01-12,WHOLE FOODS,-65.00,debit,Groceries,Checking,C002").unwrap();
        file
    }

    #[test]
    fn test_load_transactions() {
        let test_file = create_test_csv();

        let rows = load_transactions(test_file.path()).unwrap();
        assert_eq!(rows.len(), 4);

        assert_eq!(rows[0].customer_id, "C001");
        assert_eq!(rows[0].amount, "4500.00");
        assert_eq!(rows[1].category, "Mortgage & Rent");
        assert_eq!(rows[3].customer_id, "C002");
        assert_eq!(rows[3].account_name, "Checking");
    }

    #[test]
    fn test_optional_columns_default_to_empty() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Customer_ID,Date,Amount,Category").unwrap();
        writeln!(file, "C009,2024-02-01,42.10,Shopping").unwrap();

        let rows = load_transactions(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].customer_id, "C009");
        assert_eq!(rows[0].transaction_type, "");
        assert_eq!(rows[0].description, "");
    }

    #[test]
    fn test_missing_required_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,date,category").unwrap();
        writeln!(file, "C001,2024-02-01,Shopping").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        assert!(matches!(
            err,
            SegmentationError::InvalidData { field: "amount", .. }
        ));
    }
}
