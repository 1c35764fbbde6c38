use std::io;

use serde::Serialize;
use crate::{
    error::{SimError, Result},
    estimators::{EstimateRecord, Method},
};

/// per-field means over a set of records, retention as % of the true support
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionFrequency {
    pub retention: f64,       // percent of true_sparsity
    pub identification: f64,
    pub nonzero: f64,
}

/// average the scores, then express retention as a percentage of `true_sparsity`
pub fn retention_frequency(records: &[EstimateRecord], true_sparsity: usize) -> Result<RetentionFrequency> {
    if true_sparsity == 0 {
        return Err(SimError::invalid_parameter("true_sparsity", true_sparsity));
    }
    if records.is_empty() {
        return Err(SimError::all_missing("no records to average"));
    }

    let n = records.len() as f64;
    let (retention, identification, nonzero) = records.iter().fold((0.0, 0.0, 0.0), |(r, i, z), rec| {
        (r + rec.retention as f64, i + rec.identification as f64, z + rec.nonzero as f64)
    });

    Ok(RetentionFrequency {
        retention: 100.0 * (retention / n) / true_sparsity as f64,
        identification: identification / n,
        nonzero: nonzero / n,
    })
}

/// mean error metric, skipping missing and non-finite entries
pub fn error_rate(errors: &[Option<f64>]) -> Result<f64> {
    let present: Vec<f64> = errors
        .iter()
        .filter_map(|e| e.filter(|v| v.is_finite()))
        .collect();

    if present.is_empty() {
        return Err(SimError::all_missing(
            format!("all {} error metrics are missing", errors.len())
        ));
    }

    Ok(present.iter().sum::<f64>() / present.len() as f64)
}

/// a record w/ the run it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedRecord {
    pub snr: f64,
    pub method: Method,
    pub replicate: usize,
    pub record: EstimateRecord,
}

/// per (snr, method) summary, the table the plots read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedSummary {
    #[serde(rename = "SNR")]
    pub snr: f64,
    #[serde(rename = "Method")]
    pub method: Method,
    #[serde(rename = "Mean_Ret")]
    pub mean_retention: f64,
    #[serde(rename = "Mean_Zero")]
    pub mean_nonzero: f64,
    #[serde(rename = "Mean_Pred")]
    pub mean_prediction: Option<f64>,
    #[serde(rename = "SD_Ret")]
    pub sd_retention: Option<f64>,
    #[serde(rename = "SD_Zero")]
    pub sd_nonzero: Option<f64>,
    #[serde(rename = "SD_Pred")]
    pub sd_prediction: Option<f64>,
}

/// sample sd, None below two values
fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((ss / (n - 1.0)).sqrt())
}

/// group by (snr, method) in first-seen order and summarize each group
pub fn summarize(records: &[TaggedRecord], true_sparsity: usize) -> Result<Vec<AggregatedSummary>> {
    let mut groups: Vec<((f64, Method), Vec<&TaggedRecord>)> = Vec::new();
    for tagged in records {
        let key = (tagged.snr, tagged.method);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(tagged),
            None => groups.push((key, vec![tagged])),
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for ((snr, method), members) in groups {
        let scores: Vec<EstimateRecord> = members.iter().map(|t| t.record).collect();
        let freq = retention_frequency(&scores, true_sparsity)?;

        let retention_pct: Vec<f64> = scores
            .iter()
            .map(|r| 100.0 * r.retention as f64 / true_sparsity as f64)
            .collect();
        let nonzero: Vec<f64> = scores.iter().map(|r| r.nonzero as f64).collect();

        let errors: Vec<Option<f64>> = scores.iter().map(|r| r.error_metric).collect();
        let mean_prediction = match error_rate(&errors) {
            Ok(mean) => Some(mean),
            Err(SimError::AllMissing { .. }) => {
                log::warn!("snr {} / {}: every error metric missing, leaving Mean_Pred empty", snr, method);
                None
            }
            Err(e) => return Err(e),
        };
        let present: Vec<f64> = errors.iter().filter_map(|e| e.filter(|v| v.is_finite())).collect();

        out.push(AggregatedSummary {
            snr,
            method,
            mean_retention: freq.retention,
            mean_nonzero: freq.nonzero,
            mean_prediction,
            sd_retention: sample_sd(&retention_pct),
            sd_nonzero: sample_sd(&nonzero),
            sd_prediction: sample_sd(&present),
        });
    }

    Ok(out)
}

#[derive(Serialize)]
struct RecordRow {
    #[serde(rename = "SNR")]
    snr: f64,
    #[serde(rename = "Method")]
    method: Method,
    #[serde(rename = "Replicate")]
    replicate: usize,
    #[serde(rename = "Retention")]
    retention: usize,
    #[serde(rename = "Identification")]
    identification: usize,
    #[serde(rename = "Nonzero")]
    nonzero: usize,
    #[serde(rename = "Prediction")]
    prediction: Option<f64>,
}

/// flat per-fit table, one row per record
pub fn write_records_csv<W: io::Write>(records: &[TaggedRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for t in records {
        wtr.serialize(RecordRow {
            snr: t.snr,
            method: t.method,
            replicate: t.replicate,
            retention: t.record.retention,
            identification: t.record.identification,
            nonzero: t.record.nonzero,
            prediction: t.record.error_metric,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// summary table, one row per (snr, method)
pub fn write_summary_csv<W: io::Write>(summaries: &[AggregatedSummary], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for s in summaries {
        wtr.serialize(s)?;
    }
    wtr.flush()?;
    Ok(())
}
