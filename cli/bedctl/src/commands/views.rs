//! Table rows and summaries shared by several commands.

use colored::Colorize;
use serde::Serialize;
use smartbed_reconcile::live::{KpiSource, KpiState};
use smartbed_reconcile::model::{Alert, Bed, Patient, TriageLevel, Ward};
use smartbed_reconcile::{BatchOutcome, SuggestionRow};
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
pub struct PatientRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Age")]
    pub age: u16,
    #[tabled(rename = "Triage")]
    pub triage: String,
    #[tabled(rename = "Acuity")]
    pub acuity: u8,
    #[tabled(rename = "Waiting")]
    pub waiting: String,
    #[tabled(rename = "Condition")]
    pub condition: String,
}

fn triage_label(level: TriageLevel) -> String {
    match level {
        TriageLevel::Red => level.as_str().red().bold().to_string(),
        TriageLevel::Yellow => level.as_str().yellow().to_string(),
        TriageLevel::Green => level.as_str().green().to_string(),
    }
}

impl From<&Patient> for PatientRow {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            age: p.age,
            triage: triage_label(p.triage_level),
            acuity: p.acuity_score.value(),
            waiting: p.wait_time.to_string(),
            condition: p.condition.clone(),
        }
    }
}

/// Queue rows, most urgent first.
pub fn queue_rows(queue: &[Patient]) -> Vec<PatientRow> {
    let mut sorted: Vec<&Patient> = queue.iter().collect();
    sorted.sort_by(|a, b| Patient::queue_order(a, b));
    sorted.into_iter().map(PatientRow::from).collect()
}

#[derive(Debug, Serialize, Tabled)]
pub struct BedRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Ward")]
    pub ward: String,
    #[tabled(rename = "Type")]
    pub bed_type: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Patient", display = "crate::output::display_option")]
    pub patient: Option<String>,
}

impl From<&Bed> for BedRow {
    fn from(b: &Bed) -> Self {
        Self {
            id: b.id.to_string(),
            ward: b.ward_name.clone().unwrap_or_else(|| b.ward_id.to_string()),
            bed_type: b.bed_type.to_string(),
            status: b.status.to_string(),
            patient: b.patient.as_ref().map(|p| format!("{} ({})", p.name, p.id)),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct WardRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Occupied")]
    pub occupied: String,
    #[tabled(rename = "Occupancy %")]
    pub occupancy_pct: u32,
    #[tabled(rename = "Staff Ratio", display = "crate::output::display_option")]
    pub staff_ratio: Option<String>,
}

impl From<&Ward> for WardRow {
    fn from(w: &Ward) -> Self {
        Self {
            id: w.id.to_string(),
            name: w.name.clone(),
            occupied: format!("{}/{}", w.current_occupancy, w.capacity),
            occupancy_pct: w.occupancy_pct(),
            staff_ratio: w.staff_ratio.map(|r| format!("{r:.2}")),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct AlertRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "When")]
    pub timestamp: String,
}

impl From<&Alert> for AlertRow {
    fn from(a: &Alert) -> Self {
        Self {
            id: a.id.value(),
            severity: format!("{:?}", a.severity).to_lowercase(),
            title: a.title.clone(),
            timestamp: a.timestamp.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PairingRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Patient")]
    pub patient_id: String,
    #[tabled(rename = "Bed")]
    pub bed_id: String,
    #[tabled(rename = "Stale", display = "crate::output::display_option")]
    pub stale: Option<String>,
}

pub fn pairing_rows(rows: &[SuggestionRow]) -> Vec<PairingRow> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| PairingRow {
            position: i + 1,
            patient_id: row.suggestion.patient_id.to_string(),
            bed_id: row.suggestion.bed_id.to_string(),
            stale: row.stale.map(|reason| reason.to_string()),
        })
        .collect()
}

#[derive(Debug, Serialize, Tabled)]
pub struct CommitRow {
    #[tabled(rename = "Patient")]
    pub patient_id: String,
    #[tabled(rename = "Bed")]
    pub bed_id: String,
    #[tabled(rename = "Result")]
    pub result: String,
}

pub fn commit_rows(outcome: &BatchOutcome) -> Vec<CommitRow> {
    outcome
        .results
        .iter()
        .map(|r| CommitRow {
            patient_id: r.suggestion.patient_id.to_string(),
            bed_id: r.suggestion.bed_id.to_string(),
            result: match &r.outcome {
                Ok(_) => "assigned".to_string(),
                Err(e) => format!("failed: {e}"),
            },
        })
        .collect()
}

/// One-line KPI summary.
pub fn kpi_line(state: &KpiState) -> String {
    let Some(k) = &state.kpis else {
        return match &state.last_error {
            Some(e) => format!("KPIs unavailable: {e}"),
            None => "KPIs not loaded".to_string(),
        };
    };

    let source = match state.source {
        Some(KpiSource::Live) => "live",
        Some(KpiSource::Fetch) => "fetched",
        None => "-",
    };
    let at = state
        .updated_at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "beds {}/{} ({}%) | ICU {}/{} ({}%) | available {} | expected 24h {} | avg wait {}m [{source} {at}]",
        k.occupied_beds,
        k.total_beds,
        k.occupancy_rate,
        k.occupied_icu,
        k.total_icu,
        k.icu_rate,
        k.available_beds(),
        k.expected_admissions_24h,
        k.avg_wait_time_mins,
    )
}
