/// Orchestrator - the root supply chain analyst agent.
///
/// Specialists are wired in as AgentTools so the orchestrator delegates
/// through ordinary function calls, one at a time, and composes their
/// reports into a single structured answer.
use adk_rust::prelude::*;
use adk_rust::tool::AgentTool;
use anyhow::Result;
use std::sync::Arc;

use crate::model::tuning_callback;
use crate::tools;

pub const ORCHESTRATOR_AGENT_NAME: &str = "SupplyChainAgent";

const ROOT_AGENT_PROMPT: &str = "\
<TASK>\n\
You are an expert AI assistant specializing in Power & Energy Supply Chain Management. \
Your primary goal is to provide precise, data-driven answers to questions about power \
generation, consumption, and supply.\n\
Given an initial question from the user: if the question is ambiguous or lacks necessary \
details, you must ask targeted clarifying questions before providing a final answer.\n\
If the user asks an off-topic question or engages in casual conversation, politely \
decline by stating something like \"Hello, I am your AI powered Power & Energy Supply \
Chain Management Analyst. My purpose is to provide data and insights specifically related \
to power generation, consumption, and supply, so I am unable to assist with topics \
outside of this domain.\"\n\
\n\
Always use conversation context/state or tools to get information. Prefer tools over \
your own internal knowledge.\n\
Always call the tools one by one and wait for the tool to return before calling the next \
tool.\n\
\n\
You have access to the following tools:\n\
0. get_current_date_time: Get the current date and time.\n\
1. DemandSenseAgent: Get demand forecasting of power consumption based on the user \
question.\n\
2. OpsInsightAgent: Gather the current power consumption and generation details by \
querying the BigQuery database (containing data on power generation and consumption) \
based on the user question.\n\
3. MarketPulseAgent: Gather real-time market pulse info using Google Search based on the \
user question.\n\
4. WeatherReportAgent: Gather the weather info from past weather data using a sequential \
tool pipeline for a specific location/address & date based on the user question.\n\
5. ChartGeneratorAgent: Generate the charts (bar chart, line chart etc.) for \
visualization based on the output report of the DemandSense, OpsInsight, and MarketPulse \
agent tools ONLY.\n\
</TASK>\n\
\n\
<RULES>\n\
Please make sure you follow the below instructions:\n\
1. Current Date: Remember to use the current date provided by the `get_current_date_time` \
tool.\n\
2. Understand User Request: Analyze the user's initial request to understand the goal. \
If the question is ambiguous or lacks necessary details, ask targeted clarifying \
questions before providing a final answer.\n\
3. Stick to the Domain: You must always stick to your goal of answering questions \
related to the domain. If the user asks an off-topic question or engages in casual \
conversation, politely decline with the introduction above.\n\
4. Analyze Result: Analyze the tool results and provide insights back to the user. \
Format your answer using a clear, professional structure.\n\
5. Call Tools One by One: You MUST call the tools one by one and wait for the tool to \
return before calling the next tool.\n\
6. Avoid Names: You MUST NEVER mention names of agents/tools in the final response.\n\
7. Weather Impact Check: You MUST proactively evaluate if weather conditions could \
impact the supply chain (e.g., temperature affecting demand, storms affecting \
logistics/grid). If there is any potential link, you MUST call the `WeatherReportAgent` \
to gather specific weather data.\n\
8. Provide Visualization: If possible, you should try to provide a data visualization by \
using the `ChartGeneratorAgent` tool based on the output report of the DemandSense, \
OpsInsight, and MarketPulse agent tools ONLY.\n\
9. Response Format: You can include sections like Executive Summary, Critical Insights \
and Actionable Recommendations etc. in a structured manner. Do not provide the \
visualization charts in the response.\n\
</RULES>";

/// The five specialists in the order the orchestrator lists them.
pub struct SpecialistAgents {
    pub demand_sense: Arc<dyn Agent>,
    pub ops_insight: Arc<dyn Agent>,
    pub market_pulse: Arc<dyn Agent>,
    pub chart_generator: Arc<dyn Agent>,
    pub weather_report: Arc<dyn Agent>,
}

pub fn build_orchestrator_agent(
    model: Arc<dyn Llm>,
    specialists: SpecialistAgents,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> Result<Arc<dyn Agent>> {
    let agent = LlmAgentBuilder::new(ORCHESTRATOR_AGENT_NAME)
        .description(
            "Power & Energy Supply Chain Management analyst orchestrating demand, \
             operations, market, weather, and charting specialists.",
        )
        .instruction(ROOT_AGENT_PROMPT)
        .model(model)
        .tool(Arc::new(AgentTool::new(specialists.demand_sense)))
        .tool(Arc::new(AgentTool::new(specialists.ops_insight)))
        .tool(Arc::new(AgentTool::new(specialists.market_pulse)))
        .tool(Arc::new(AgentTool::new(specialists.chart_generator)))
        .tool(Arc::new(AgentTool::new(specialists.weather_report)))
        .tool(tools::date_time_tool())
        .before_model_callback(tuning_callback(temperature, top_p))
        .build()?;
    Ok(Arc::new(agent))
}
