//! Python bindings.
//!
//! For hosts that keep persistence on the Python side: records are built
//! and enriched here, returned as JSON, and inserted by the host with the
//! statement from `submission_insert_sql`.

use std::sync::Arc;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::analytics::{conversion_rates, EXPORT_COLUMNS};
use crate::enrichment::{get_geo_table, get_geo_table_mut, OfflineGeoTable, RegexUserAgentParser, SharedGeoTable};
use crate::logging::structured::{init_logger, payload_hash};
use crate::pipeline::{Enricher, RequestContext};
use crate::storage::queries::build_submission_insert;

fn enricher() -> Enricher {
    Enricher::new(Arc::new(SharedGeoTable), Arc::new(RegexUserAgentParser::new()))
}

fn parse_json(name: &str, raw: &str) -> PyResult<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| PyValueError::new_err(format!("invalid {} JSON: {}", name, e)))
}

/// Build an enriched submission record.
///
/// # Arguments
/// * `payload` - Raw form body (object or array of objects), JSON encoded
/// * `context` - Request metadata (headers, remote addresses), JSON encoded
///
/// # Returns
/// Dict with `request_id`, `status` ("ok", "degraded" or "rejected"),
/// `record` (JSON, absent when rejected) and `error` (absent when ok).
/// A degraded record should be inserted exactly like an ok one.
#[pyfunction]
#[pyo3(signature = (payload, context=None))]
fn prepare_submission(py: Python<'_>, payload: String, context: Option<String>) -> PyResult<Py<PyAny>> {
    init_logger();

    let body = parse_json("payload", &payload)?;
    let ctx: RequestContext = match context {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| PyValueError::new_err(format!("invalid context JSON: {}", e)))?,
        None => RequestContext::new(),
    };
    let log_ctx = ctx.log_context("prepare");
    let enricher = enricher();

    let result = PyDict::new(py);
    result.set_item("request_id", &ctx.request_id)?;

    match enricher.build_submission(&body, &ctx, &log_ctx) {
        Ok(record) => {
            result.set_item("status", "ok")?;
            result.set_item("record", serde_json::to_string(&record).map_err(|e| PyValueError::new_err(e.to_string()))?)?;
        }
        Err(error) => {
            log::error!(
                "{} SUBMISSION_FAILED error={} payload_hash={}",
                log_ctx,
                error,
                payload_hash(&payload)
            );
            result.set_item("error", error.to_string())?;
            match enricher.build_degraded(&body, &ctx) {
                Some(record) => {
                    result.set_item("status", "degraded")?;
                    result.set_item(
                        "record",
                        serde_json::to_string(&record).map_err(|e| PyValueError::new_err(e.to_string()))?,
                    )?;
                }
                None => result.set_item("status", "rejected")?,
            }
        }
    }

    Ok(result.into())
}

/// INSERT statement and its bind column order for prepared records.
#[pyfunction]
fn submission_insert_sql() -> PyResult<(String, Vec<String>)> {
    Ok((
        build_submission_insert(),
        crate::storage::queries::get_submission_columns()
            .into_iter()
            .map(str::to_string)
            .collect(),
    ))
}

/// Replace the process-wide offline geolocation table.
///
/// # Arguments
/// * `table_json` - JSON array of `{start, end, country, city, ...}` ranges
///
/// # Returns
/// Number of ranges loaded
#[pyfunction]
fn load_geo_table(table_json: String) -> PyResult<usize> {
    init_logger();
    let table = OfflineGeoTable::from_json(&table_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let loaded = table.len();
    *get_geo_table_mut() = table;
    Ok(loaded)
}

#[pyfunction]
fn clear_geo_table() -> PyResult<()> {
    init_logger();
    get_geo_table_mut().clear();
    Ok(())
}

/// Returns (range_count, table_age_secs)
#[pyfunction]
fn geo_table_status() -> PyResult<(usize, Option<u64>)> {
    let table = get_geo_table();
    Ok((table.len(), table.table_age_secs()))
}

/// Stage-over-previous conversion rates for funnel stage counts.
#[pyfunction]
fn compute_funnel(counts: Vec<u64>) -> PyResult<Vec<f64>> {
    Ok(conversion_rates(&counts))
}

/// Export (key, title) pairs in column order.
#[pyfunction]
fn export_columns() -> PyResult<Vec<(String, String)>> {
    Ok(EXPORT_COLUMNS
        .iter()
        .map(|c| (c.key.to_string(), c.title.to_string()))
        .collect())
}

/// Python module definition
#[pymodule]
fn leadlens_core(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(prepare_submission, m)?)?;
    m.add_function(wrap_pyfunction!(submission_insert_sql, m)?)?;
    m.add_function(wrap_pyfunction!(load_geo_table, m)?)?;
    m.add_function(wrap_pyfunction!(clear_geo_table, m)?)?;
    m.add_function(wrap_pyfunction!(geo_table_status, m)?)?;
    m.add_function(wrap_pyfunction!(compute_funnel, m)?)?;
    m.add_function(wrap_pyfunction!(export_columns, m)?)?;
    Ok(())
}
