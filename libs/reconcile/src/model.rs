//! Snapshot value types.
//!
//! Everything here is replaced wholesale by a fetch; nothing is merged
//! field-by-field. Field names follow the backend's snake_case wire format.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use smartbed_id::{AlertId, BedId, PatientId, WardId};

use crate::error::ConsoleError;

// =============================================================================
// Triage
// =============================================================================

/// Severity classification. Ordered by severity: `Green < Yellow < Red`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TriageLevel {
    /// Standard.
    Green,
    /// Urgent.
    Yellow,
    /// Critical.
    Red,
}

impl TriageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "Green",
            Self::Yellow => "Yellow",
            Self::Red => "Red",
        }
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageLevel {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(Self::Red),
            "yellow" => Ok(Self::Yellow),
            "green" => Ok(Self::Green),
            other => Err(ConsoleError::Invalid(format!(
                "unknown triage level '{other}' (expected red, yellow or green)"
            ))),
        }
    }
}

/// Numeric severity indicator in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct AcuityScore(u8);

impl AcuityScore {
    pub const MAX: u8 = 100;

    pub fn new(score: u8) -> Result<Self, ConsoleError> {
        if score > Self::MAX {
            return Err(ConsoleError::Invalid(format!(
                "acuity score {score} out of range 0..={}",
                Self::MAX
            )));
        }
        Ok(Self(score))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for AcuityScore {
    type Error = ConsoleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let score = u8::try_from(value).map_err(|_| {
            ConsoleError::Invalid(format!("acuity score {value} out of range 0..=100"))
        })?;
        Self::new(score)
    }
}

impl From<AcuityScore> for u8 {
    fn from(score: AcuityScore) -> Self {
        score.0
    }
}

impl fmt::Display for AcuityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Wait Duration
// =============================================================================

/// Observed time a patient has been waiting, in whole minutes.
///
/// The backend sends either an integer number of minutes or a short string
/// such as `"14m"` or `"1h 5m"`; both decode here. Serializes as minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitDuration(u32);

impl WaitDuration {
    pub const fn from_minutes(minutes: u32) -> Self {
        Self(minutes)
    }

    pub const fn minutes(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WaitDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hours, minutes) = (self.0 / 60, self.0 % 60);
        if hours == 0 {
            write!(f, "{minutes}m")
        } else if minutes == 0 {
            write!(f, "{hours}h")
        } else {
            write!(f, "{hours}h {minutes}m")
        }
    }
}

impl FromStr for WaitDuration {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConsoleError::Invalid(format!("unrecognised wait duration '{s}'"));

        if s.is_empty() {
            return Err(invalid());
        }
        if let Ok(minutes) = s.parse::<u32>() {
            return Ok(Self(minutes));
        }

        let mut total: u32 = 0;
        let mut digits = String::new();
        for c in s.chars() {
            match c {
                '0'..='9' => digits.push(c),
                'd' | 'h' | 'm' => {
                    let n: u32 = digits.parse().map_err(|_| invalid())?;
                    digits.clear();
                    let factor = match c {
                        'd' => 24 * 60,
                        'h' => 60,
                        _ => 1,
                    };
                    total = total.saturating_add(n.saturating_mul(factor));
                }
                c if c.is_whitespace() => {}
                _ => return Err(invalid()),
            }
        }

        if !digits.is_empty() {
            return Err(invalid());
        }
        Ok(Self(total))
    }
}

impl Serialize for WaitDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for WaitDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Minutes(u64),
            Fractional(f64),
            Text(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Self::default()),
            Some(Raw::Minutes(m)) => Ok(Self(u32::try_from(m).unwrap_or(u32::MAX))),
            Some(Raw::Fractional(f)) if f >= 0.0 => Ok(Self(f.round() as u32)),
            Some(Raw::Fractional(f)) => Err(de::Error::custom(format!(
                "negative wait duration {f}"
            ))),
            Some(Raw::Text(t)) => t.parse().map_err(de::Error::custom),
        }
    }
}

// =============================================================================
// Patients
// =============================================================================

/// Patient lifecycle status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatientStatus {
    #[serde(rename = "In Queue")]
    InQueue,
    Assigned,
    Discharged,
    #[serde(other)]
    Unknown,
}

/// A patient snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: u16,
    pub condition: String,
    pub triage_level: TriageLevel,
    pub acuity_score: AcuityScore,

    /// Absent on queue listings, where every entry is queued.
    #[serde(default)]
    pub status: Option<PatientStatus>,

    #[serde(default)]
    pub wait_time: WaitDuration,
}

impl Patient {
    /// Queue ordering: most severe triage first, then highest acuity,
    /// then longest wait.
    pub fn queue_order(a: &Patient, b: &Patient) -> std::cmp::Ordering {
        b.triage_level
            .cmp(&a.triage_level)
            .then(b.acuity_score.cmp(&a.acuity_score))
            .then(b.wait_time.cmp(&a.wait_time))
    }
}

/// Request body for the quick-add endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NewPatient {
    pub name: String,
    pub age: u16,
    pub condition: String,
    pub triage_level: TriageLevel,
    pub acuity_score: AcuityScore,
}

impl NewPatient {
    /// Check the fields the backend does not validate.
    pub fn validate(&self) -> Result<(), ConsoleError> {
        if self.name.trim().is_empty() {
            return Err(ConsoleError::Invalid("patient name is required".into()));
        }
        if self.condition.trim().is_empty() {
            return Err(ConsoleError::Invalid("condition is required".into()));
        }
        if self.age > 130 {
            return Err(ConsoleError::Invalid(format!("implausible age {}", self.age)));
        }
        Ok(())
    }
}

// =============================================================================
// Beds and Wards
// =============================================================================

/// Bed status. The set is open; unrecognised values decode as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BedStatus {
    Available,
    Occupied,
    Cleaning,
    #[serde(rename = "Maintenance", alias = "OutOfService", alias = "Out of Service")]
    OutOfService,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Occupied => "Occupied",
            Self::Cleaning => "Cleaning",
            Self::OutOfService => "Out of service",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for BedStatus {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "available" => Ok(Self::Available),
            "occupied" => Ok(Self::Occupied),
            "cleaning" => Ok(Self::Cleaning),
            "maintenance" | "outofservice" => Ok(Self::OutOfService),
            _ => Err(ConsoleError::Invalid(format!("unknown bed status '{s}'"))),
        }
    }
}

/// Bed category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BedCategory {
    #[serde(rename = "ICU")]
    Icu,
    #[serde(rename = "Step-Down")]
    StepDown,
    General,
    #[serde(other)]
    Other,
}

impl fmt::Display for BedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Icu => "ICU",
            Self::StepDown => "Step-Down",
            Self::General => "General",
            Self::Other => "Other",
        };
        f.write_str(s)
    }
}

/// A bed snapshot, with the occupant embedded when occupied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub id: BedId,
    pub ward_id: WardId,
    #[serde(default)]
    pub ward_name: Option<String>,
    pub bed_type: BedCategory,
    pub status: BedStatus,
    #[serde(default)]
    pub patient: Option<Patient>,
}

impl Bed {
    /// A bed carries a patient iff it is occupied.
    pub fn is_consistent(&self) -> bool {
        (self.status == BedStatus::Occupied) == self.patient.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.status == BedStatus::Available
    }
}

/// A ward snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ward {
    pub id: WardId,
    pub name: String,
    pub capacity: u32,
    pub current_occupancy: u32,
    #[serde(default)]
    pub occupancy_rate: Option<u32>,
    #[serde(default)]
    pub staff_ratio: Option<f64>,
}

impl Ward {
    /// Occupancy never exceeds capacity.
    pub fn is_consistent(&self) -> bool {
        self.current_occupancy <= self.capacity
    }

    /// Occupancy as a percentage of capacity; 0 for an empty ward.
    pub fn occupancy_pct(&self) -> u32 {
        self.occupancy_rate.unwrap_or_else(|| {
            if self.capacity == 0 {
                0
            } else {
                self.current_occupancy * 100 / self.capacity
            }
        })
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// Key performance indicators. Replaced wholesale by fetches and by live updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub occupancy_rate: u32,
    pub total_icu: u32,
    pub occupied_icu: u32,
    pub icu_rate: u32,
    pub expected_admissions_24h: u32,
    pub avg_wait_time_mins: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_beds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ed_queue_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_patients: Option<u32>,
}

impl Kpis {
    /// Available beds, derived from totals when the backend omits it.
    pub fn available_beds(&self) -> u32 {
        self.available_beds
            .unwrap_or_else(|| self.total_beds.saturating_sub(self.occupied_beds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

/// An active operational alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: AlertSeverity,
    pub timestamp: NaiveDateTime,
}

// =============================================================================
// Forecast
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    #[serde(default)]
    pub rmse: Option<f64>,
    #[serde(default)]
    pub mae: Option<f64>,
    #[serde(default)]
    pub model_type: Option<String>,
}

/// One day of the admissions forecast. Historical days carry `actual` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: String,
    #[serde(default)]
    pub actual: Option<f64>,
    #[serde(default)]
    pub predicted: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub metrics: ForecastMetrics,
    pub data: Vec<ForecastPoint>,
}

// =============================================================================
// Simulator
// =============================================================================

/// Multipliers for a what-if capacity run. `1.0` everywhere is the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimRequest {
    pub acuity_modifier: f64,
    pub inflow_modifier: f64,
    pub staff_availability: f64,
}

impl Default for SimRequest {
    fn default() -> Self {
        Scenario::Baseline.request()
    }
}

impl SimRequest {
    pub const INFLOW_RANGE: (f64, f64) = (0.5, 3.0);
    pub const ACUITY_RANGE: (f64, f64) = (0.8, 2.0);
    pub const STAFF_RANGE: (f64, f64) = (0.5, 1.0);

    /// Reject multipliers outside the ranges the simulator is tuned for.
    pub fn validate(&self) -> Result<(), ConsoleError> {
        check_range("inflow_modifier", self.inflow_modifier, Self::INFLOW_RANGE)?;
        check_range("acuity_modifier", self.acuity_modifier, Self::ACUITY_RANGE)?;
        check_range("staff_availability", self.staff_availability, Self::STAFF_RANGE)
    }
}

fn check_range(field: &str, value: f64, (min, max): (f64, f64)) -> Result<(), ConsoleError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConsoleError::Invalid(format!(
            "{field} must be between {min} and {max}, got {value}"
        )))
    }
}

/// Named presets for [`SimRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Baseline,
    Surge,
    Disaster,
}

impl Scenario {
    pub fn request(self) -> SimRequest {
        let (acuity_modifier, inflow_modifier, staff_availability) = match self {
            Self::Baseline => (1.0, 1.0, 1.0),
            Self::Surge => (1.2, 1.5, 0.9),
            Self::Disaster => (1.5, 2.5, 0.7),
        };
        SimRequest {
            acuity_modifier,
            inflow_modifier,
            staff_availability,
        }
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "surge" => Ok(Self::Surge),
            "disaster" => Ok(Self::Disaster),
            other => Err(format!(
                "unknown scenario '{other}' (expected baseline, surge or disaster)"
            )),
        }
    }
}

/// One sample of the projected occupancy curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimPoint {
    /// Hours from now. The backend sends these as strings.
    #[serde(deserialize_with = "hour_offset")]
    pub hour: u32,
    pub occupancy: u32,
    pub capacity: u32,
}

impl SimPoint {
    pub fn is_over_capacity(&self) -> bool {
        self.occupancy > self.capacity
    }
}

fn hour_offset<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(h) => Ok(h),
        Raw::Text(t) => t.trim().parse().map_err(de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMetrics {
    pub max_occupancy_pct: u32,
    pub avg_wait_mins: u32,
    pub patients_diverted: u32,
}

/// How hard a projected peak presses on capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pressure {
    Manageable,
    Strained,
    Exceeded,
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manageable => "manageable",
            Self::Strained => "strained",
            Self::Exceeded => "capacity exceeded",
        })
    }
}

impl SimMetrics {
    pub fn pressure(&self) -> Pressure {
        match self.max_occupancy_pct {
            100.. => Pressure::Exceeded,
            85..=99 => Pressure::Strained,
            _ => Pressure::Manageable,
        }
    }
}

/// Result of `POST /api/simulator/run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    pub timeline: Vec<SimPoint>,
    pub metrics: SimMetrics,
}

impl SimResult {
    /// The busiest sample, first one wins on ties.
    pub fn peak(&self) -> Option<&SimPoint> {
        self.timeline
            .iter()
            .reduce(|best, p| if p.occupancy > best.occupancy { p } else { best })
    }
}
