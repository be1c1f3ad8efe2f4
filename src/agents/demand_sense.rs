/// Demand sense agent - power consumption forecasting over warehouse history.
use adk_rust::prelude::*;
use anyhow::Result;
use std::sync::Arc;

use crate::model::tuning_callback;
use crate::tools;
use crate::tools::warehouse::Warehouse;

pub const DEMAND_SENSE_AGENT_NAME: &str = "DemandSenseAgent";
pub const DEMAND_SENSE_OUTPUT_KEY: &str = "demand_sense_report";

const DEMAND_SENSE_PROMPT: &str = "\
<TASK>\n\
You are an Expert Demand Forecasting Agent, specialized in forecasting power consumption.\n\
Your primary goal is to understand the user's question about future power consumption and \
use the `get_demand_forecast` tool to fetch the required data.\n\
Never say you can not answer; you are trying to gather the best possible information for \
the user's question which might be useful.\n\
</TASK>\n\
\n\
<RULES>\n\
Please make sure you follow the below instructions:\n\
1. Scope: The geographical area or entity of the forecast. This can be a specific state, \
a region, a power_supplier, any combination of these, or a national forecast if no scope \
is mentioned.\n\
2. Time Period: The number of days to forecast into the future.\n\
3. Tool Usage: You must use the `get_demand_forecast` tool, passing the parameters \
extracted from the user question.\n\
4. Analysis Summary: Interpret the results returned by the tool and provide a concise \
analysis summary of 100 words or less.\n\
</RULES>";

pub fn build_demand_sense_agent(
    model: Arc<dyn Llm>,
    warehouse: Arc<dyn Warehouse>,
    default_history_days: u32,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> Result<Arc<dyn Agent>> {
    let agent = LlmAgentBuilder::new(DEMAND_SENSE_AGENT_NAME)
        .description(
            "Get demand forecasting of power consumption using the demand forecast tool based on the user question.",
        )
        .instruction(DEMAND_SENSE_PROMPT)
        .model(model)
        .tool(tools::demand_forecast_tool(warehouse, default_history_days))
        .before_model_callback(tuning_callback(temperature, top_p))
        .output_key(DEMAND_SENSE_OUTPUT_KEY)
        .build()?;
    Ok(Arc::new(agent))
}
