use pricebook_core::{parse_date, ListRequest, QueryService, Symbol};
use serde_json::{json, Value};

use crate::cli::ListArgs;
use crate::error::CliError;

pub async fn run(args: &ListArgs, service: &QueryService) -> Result<Value, CliError> {
    let request = to_request(args)?;
    let page = service.list(&request).await?;

    Ok(json!({
        "total": page.total,
        "page": request.page,
        "limit": request.limit,
        "records": page.records,
    }))
}

fn to_request(args: &ListArgs) -> Result<ListRequest, CliError> {
    Ok(ListRequest {
        limit: args.limit,
        page: args.page,
        start_date: args.start_date.as_deref().map(parse_date).transpose()?,
        end_date: args.end_date.as_deref().map(parse_date).transpose()?,
        symbol: args.symbol.as_deref().map(Symbol::parse).transpose()?,
    })
}
