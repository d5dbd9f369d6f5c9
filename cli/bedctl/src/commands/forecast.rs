//! Admissions forecast.

use anyhow::Result;
use serde::Serialize;
use smartbed_reconcile::model::ForecastPoint;
use tabled::Tabled;

use super::CommandContext;
use crate::error::CliError;
use crate::output::{display_option, print_info, print_output, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
struct ForecastRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Actual", display = "crate::output::display_option")]
    actual: Option<String>,
    #[tabled(rename = "Predicted", display = "crate::output::display_option")]
    predicted: Option<String>,
    #[tabled(rename = "Range", display = "crate::output::display_option")]
    range: Option<String>,
}

fn one_decimal(v: Option<f64>) -> Option<String> {
    v.map(|v| format!("{v:.1}"))
}

impl From<&ForecastPoint> for ForecastRow {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            date: p.date.clone(),
            actual: one_decimal(p.actual),
            predicted: one_decimal(p.predicted),
            range: match (p.lower, p.upper) {
                (Some(lo), Some(hi)) => Some(format!("{lo:.1}-{hi:.1}")),
                _ => None,
            },
        }
    }
}

pub async fn show_forecast(ctx: CommandContext) -> Result<()> {
    let (session, backend) = ctx.backend()?;

    let role = session.profile().role;
    if !role.is_planner() {
        return Err(CliError::NotPermitted {
            role: role.to_string(),
            action: "view the forecast",
        }
        .into());
    }

    let forecast = backend.forecast().await?;

    let rows: Vec<ForecastRow> = forecast.data.iter().map(ForecastRow::from).collect();
    print_output(&rows, &forecast, ctx.format);

    if ctx.format == OutputFormat::Table {
        let m = &forecast.metrics;
        print_info(&format!(
            "model {} | RMSE {} | MAE {}",
            m.model_type.as_deref().unwrap_or("-"),
            display_option(&one_decimal(m.rmse)),
            display_option(&one_decimal(m.mae)),
        ));
    }
    Ok(())
}
