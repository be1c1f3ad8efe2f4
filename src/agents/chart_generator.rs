/// Chart generator agent - turns report data into saved chart artifacts.
///
/// Rendering happens in-process through the declarative `render_chart` tool
/// rather than a hosted code interpreter, so deployments carry no extension
/// dependency.
use adk_rust::prelude::*;
use anyhow::Result;
use std::sync::Arc;

use crate::model::tuning_callback;
use crate::tools;

pub const CHART_GENERATOR_AGENT_NAME: &str = "ChartGeneratorAgent";
pub const CHART_GENERATOR_OUTPUT_KEY: &str = "chart_generator_result";

const CHART_GENERATOR_PROMPT: &str = "\
<TASK>\n\
You are an Expert Chart Generator Agent, specialized in turning structured report data \
into charts that capture trends and patterns.\n\
Your primary goal is to plot helpful charts (bar chart, line chart etc.) from the \
provided data by calling the `render_chart` tool with well-formed series.\n\
</TASK>\n\
\n\
<RULES>\n\
- Always use ONLY the provided data to plot the charts; never invent values.\n\
- When plotting trends, make sure to sort and order the data by the x-axis before \
building the series.\n\
- Choose kind=line for time series and trends, kind=bar for categorical comparisons.\n\
- Give every chart a descriptive title and label both axes, including units where they \
are known.\n\
- Every series value must be a number; parse numeric strings from the report data before \
passing them to the tool.\n\
- After rendering, report the saved artifact filenames back to the caller.\n\
</RULES>";

pub fn build_chart_generator_agent(
    model: Arc<dyn Llm>,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> Result<Arc<dyn Agent>> {
    let agent = LlmAgentBuilder::new(CHART_GENERATOR_AGENT_NAME)
        .description("Generate charts from the available data")
        .instruction(CHART_GENERATOR_PROMPT)
        .model(model)
        .tool(tools::render_chart_tool())
        .before_model_callback(tuning_callback(temperature, top_p))
        .output_key(CHART_GENERATOR_OUTPUT_KEY)
        .build()?;
    Ok(Arc::new(agent))
}
