//! CSV fixtures shared by the unit tests

use std::io::Write;
use tempfile::NamedTempFile;

pub(crate) const HEADER: &str = "Customer_ID,Age,Gender,Marital_Status,Region,Account_Type,\
Account_Balance,Transaction_Amount,Transaction_Date,Account_Open_Date,Last_Transaction_Date,\
Loan_Amount,Loan_Type,Credit_Score,Annual_Income,Customer_Service_Interactions,\
Recent_Complaints,Customer_Satisfaction_Score,Churn_Label,Churn_Timeframe";

/// One deterministic customer row. Everything except age and churn is
/// derived from the row index so that no other column tracks the label.
pub(crate) fn customer_line(i: usize, age: u32, churn: u8) -> String {
    let gender = ["Male", "Female"][i % 2];
    let marital = ["Single", "Married", "Divorced"][i % 3];
    let region = ["North", "South", "East", "West"][i % 4];
    let account = ["Savings", "Current"][i % 2];
    let loan_type = ["Personal", "Mortgage", "Auto"][i % 3];
    let balance = 1_000 + (i * 7_919) % 9_000;
    let amount = 50 + (i * 131) % 950;
    let loan = (i * 3_571) % 12_000;
    let credit = 300 + (i * 613) % 550;
    let income = 20_000 + (i * 4_409) % 80_000;
    let month = 1 + i % 12;
    let timeframe = if churn == 1 { 1 + i % 12 } else { 0 };

    format!(
        "C{i:04},{age},{gender},{marital},{region},{account},{balance},{amount},\
2023-{month:02}-15,2018-03-01,2023-{month:02}-28,{loan},{loan_type},{credit},{income},\
{},{},{},{churn},{timeframe}",
        i % 6,
        i % 3,
        1 + i % 5,
    )
}

/// `n` rows with ages spread evenly over 18..=90 and churn exactly when age > 60.
pub(crate) fn synthetic_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let age = 18 + (i * 72 / n.saturating_sub(1).max(1)) as u32;
            customer_line(i, age, u8::from(age > 60))
        })
        .collect()
}

pub(crate) fn write_csv(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}
