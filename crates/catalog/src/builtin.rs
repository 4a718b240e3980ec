//! Built-in operations.
//!
//! Every built-in operation is a read request whose response is parsed as JSON
//! and returned to the awaiting caller ([`Pipeline::json_data`]).

use courier_core::{Descriptor, Pipeline, RegistryBuilder, RegistryError};

/// Root of the web-interface API the built-in operations target.
pub const API_BASE: &str = "https://api.bilibili.com/x/web-interface";

fn endpoint(path: &str) -> String {
    format!("{API_BASE}/{path}")
}

/// Weekly "must-watch" ranking series.
pub fn weekly_ranking() -> Vec<(&'static str, Descriptor)> {
    vec![
        (
            "getWeeklyRankingSeriesList",
            Descriptor::get(endpoint("popular/series/")).with_pipeline(Pipeline::json_data()),
        ),
        (
            "getWeeklyRankingSeriesDetail",
            Descriptor::get(endpoint("popular/series/one"))
                .with_param("number", 1)
                .with_pipeline(Pipeline::json_data()),
        ),
    ]
}

/// Per-partition listings. `231` is the default partition id.
pub fn partition() -> Vec<(&'static str, Descriptor)> {
    vec![
        (
            "getPartitionHotRankList",
            Descriptor::get(endpoint("newlist_rank"))
                .with_param("search_type", "video")
                .with_param("view_type", "hot_rank")
                .with_param("order", "click")
                .with_param("cate_id", 231)
                .with_param("page", 1)
                .with_param("pagesize", 2)
                .with_param("time_from", "20240716")
                .with_param("time_to", "20240723")
                .with_pipeline(Pipeline::json_data()),
        ),
        (
            "getPartitionRealtimeList",
            Descriptor::get(endpoint("dynamic/region"))
                .with_param("pn", 1)
                .with_param("ps", 10)
                .with_param("rid", 231)
                .with_pipeline(Pipeline::json_data()),
        ),
        (
            "getPartitionForYouList",
            Descriptor::get(endpoint("region/feed/rcmd"))
                .with_param("request_cnt", 10)
                .with_param("from_region", 1005)
                .with_param("device", "web")
                .with_param("plat", 30)
                .with_pipeline(Pipeline::json_data()),
        ),
    ]
}

/// All built-in operations.
pub fn builtin() -> Vec<(&'static str, Descriptor)> {
    let mut all = weekly_ranking();
    all.extend(partition());
    all
}

/// Registers every built-in operation.
///
/// # Errors
///
/// Fails if any built-in name is already registered on `builder`.
pub fn register_builtin(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    let catalog = builtin();
    let count = catalog.len();
    builder.descriptors(catalog)?;
    tracing::debug!(count, "registered built-in operations");
    Ok(())
}
