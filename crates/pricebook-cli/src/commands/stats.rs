use pricebook_core::{parse_date, QueryService, StatisticsRequest, Symbol};
use serde_json::{json, Value};

use crate::cli::StatsArgs;
use crate::error::CliError;

pub async fn run(args: &StatsArgs, service: &QueryService) -> Result<Value, CliError> {
    let request = StatisticsRequest {
        start_date: parse_date(&args.start_date)?,
        end_date: parse_date(&args.end_date)?,
        symbol: Symbol::parse(&args.symbol)?,
    };
    let statistics = service.statistics(&request).await?;

    Ok(json!({
        "symbol": request.symbol,
        "start_date": args.start_date.trim(),
        "end_date": args.end_date.trim(),
        "statistics": statistics,
    }))
}
