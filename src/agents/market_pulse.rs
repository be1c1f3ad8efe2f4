/// Market pulse agent - real-time external signals via Google Search.
///
/// Search grounding cannot be combined with function tools on the same
/// Gemini call, so the search lives on a dedicated inner agent that the
/// market pulse agent reaches through an AgentTool.
use adk_rust::prelude::*;
use adk_rust::tool::AgentTool;
use anyhow::Result;
use std::sync::Arc;

use crate::model::tuning_callback;

pub const MARKET_PULSE_AGENT_NAME: &str = "MarketPulseAgent";
pub const MARKET_PULSE_OUTPUT_KEY: &str = "market_pulse_report";
pub const SEARCH_GROUNDING_AGENT_NAME: &str = "google_search_grounding";

const SEARCH_GROUNDING_PROMPT: &str = "\
Answer the user's question directly using the google_search grounding tool.\n\
Examine the search results, focusing on key areas: weather forecasts, commodity prices \
(especially coal and gas), major economic news, government energy policies, and grid \
infrastructure updates.\n\
Provide a brief but concise response covering the real-world events and external factors \
that could impact the power supply chain.\n\
Do not ask the user to check or look up information for themselves, that's your role; \
do your best to be informative.";

const MARKET_PULSE_PROMPT: &str = "\
<TASK>\n\
You are an Expert Market Pulse Agent, specialized in analysing real-time external events.\n\
Your primary goal is to find the real-world events and external factors, using the \
`google_search_grounding` tool, that could impact the power supply chain based on the \
user's question.\n\
Never say you can not answer; you are trying to gather the best possible information for \
the user's question which might be useful.\n\
</TASK>\n\
\n\
<RULES>\n\
Please make sure you follow the below instructions:\n\
1. Scope: Analyze the user's question to understand what kind of external information you \
can gather.\n\
2. Search Queries: Formulate targeted Google Search queries to find the most relevant and \
recent information.\n\
3. Search Results: Examine the search results, focusing on key areas: weather forecasts, \
commodity prices (especially coal and gas), major economic news, government energy \
policies, and grid infrastructure updates.\n\
4. Tool Usage: You MUST always use `google_search_grounding` to gather real-time market \
pulse info based on the user question. Do not rely on your internal knowledge, as it may \
be outdated. Your world is the live internet.\n\
5. Synthesize, Don't Just List: Do not simply list search results or snippets. Read and \
understand the information, then provide a coherent summary that connects each event to a \
potential impact.\n\
6. Analysis Summary: Interpret the results returned by the tool and provide a concise \
analysis summary of 100 words or less.\n\
</RULES>";

fn build_search_grounding_agent(model: Arc<dyn Llm>) -> Result<Arc<dyn Agent>> {
    let agent = LlmAgentBuilder::new(SEARCH_GROUNDING_AGENT_NAME)
        .description("An agent providing Google-search grounding capability")
        .instruction(SEARCH_GROUNDING_PROMPT)
        .model(model)
        .tool(Arc::new(GoogleSearchTool::new()))
        .build()?;
    Ok(Arc::new(agent))
}

pub fn build_market_pulse_agent(
    model: Arc<dyn Llm>,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> Result<Arc<dyn Agent>> {
    let search_grounding = build_search_grounding_agent(model.clone())?;
    let agent = LlmAgentBuilder::new(MARKET_PULSE_AGENT_NAME)
        .description(
            "Gather real-time market pulse info using Google Search tool based on the user question.",
        )
        .instruction(MARKET_PULSE_PROMPT)
        .model(model)
        .tool(Arc::new(AgentTool::new(search_grounding)))
        .before_model_callback(tuning_callback(temperature, top_p))
        .output_key(MARKET_PULSE_OUTPUT_KEY)
        .build()?;
    Ok(Arc::new(agent))
}
