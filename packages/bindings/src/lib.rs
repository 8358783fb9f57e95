use chrono::NaiveDate;
use napi::Result as NapiResult;
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use leaseterm_core::indexation::{self, IndexationInput};
use leaseterm_core::proration::{self, ProrationInput};
use leaseterm_core::reconcile::CalculationRequest;
use leaseterm_core::workbook::{LeaseWorkbook, TermDatesChange};
use leaseterm_core::ComputationOutput;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Workbook operations hand back the updated workbook with their result.
#[derive(Serialize)]
struct WorkbookResponse<T: Serialize> {
    workbook: LeaseWorkbook,
    output: ComputationOutput<T>,
}

fn respond<T: Serialize>(workbook: LeaseWorkbook, output: ComputationOutput<T>) -> NapiResult<String> {
    serde_json::to_string(&WorkbookResponse { workbook, output }).map_err(to_napi_error)
}

fn parse_workbook(workbook_json: &str) -> NapiResult<LeaseWorkbook> {
    LeaseWorkbook::from_json(workbook_json).map_err(to_napi_error)
}

fn parse_date(text: &str) -> NapiResult<NaiveDate> {
    text.parse::<NaiveDate>()
        .map_err(|e| to_napi_error(format!("invalid date '{text}': {e}")))
}

#[derive(Deserialize)]
struct TerminationRequest {
    date: NaiveDate,
    #[serde(default)]
    confirm: bool,
}

// ---------------------------------------------------------------------------
// Workbook
// ---------------------------------------------------------------------------

#[napi]
pub fn verify_workbook(workbook_json: String, until: String) -> NapiResult<String> {
    let mut workbook = parse_workbook(&workbook_json)?;
    let output = workbook
        .verify_until(parse_date(&until)?)
        .map_err(to_napi_error)?;
    respond(workbook, output)
}

#[napi]
pub fn approve_workbook_terms(workbook_json: String) -> NapiResult<String> {
    let mut workbook = parse_workbook(&workbook_json)?;
    let output = workbook.approve_all_terms().map_err(to_napi_error)?;
    respond(workbook, output)
}

#[napi]
pub fn calculate_workbook(workbook_json: String, request_json: String) -> NapiResult<String> {
    let mut workbook = parse_workbook(&workbook_json)?;
    let request: CalculationRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let output = workbook.calculate(&request).map_err(to_napi_error)?;
    respond(workbook, output)
}

#[napi]
pub fn change_workbook_term_dates(workbook_json: String, change_json: String) -> NapiResult<String> {
    let mut workbook = parse_workbook(&workbook_json)?;
    let change: TermDatesChange = serde_json::from_str(&change_json).map_err(to_napi_error)?;
    let output = workbook.change_term_dates(&change).map_err(to_napi_error)?;
    respond(workbook, output)
}

#[napi]
pub fn terminate_workbook(workbook_json: String, request_json: String) -> NapiResult<String> {
    let mut workbook = parse_workbook(&workbook_json)?;
    let request: TerminationRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let output = workbook
        .terminate(request.date, request.confirm)
        .map_err(to_napi_error)?;
    respond(workbook, output)
}

// ---------------------------------------------------------------------------
// Calculators
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_indexation(input_json: String) -> NapiResult<String> {
    let input: IndexationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = indexation::calculate_indexation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn prorate_amount(input_json: String) -> NapiResult<String> {
    let input: ProrationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = proration::prorate(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
