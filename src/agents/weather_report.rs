/// Weather report agent - sequential five-step Open-Meteo pipeline.
use adk_rust::prelude::*;
use anyhow::Result;
use std::sync::Arc;

use crate::model::tuning_callback;
use crate::tools;
use crate::tools::weather::WeatherService;

pub const WEATHER_REPORT_AGENT_NAME: &str = "WeatherReportAgent";
pub const WEATHER_REPORT_OUTPUT_KEY: &str = "weather_info_report";

const WEATHER_REPORT_PROMPT: &str = "\
<TASK>\n\
You are an Expert Weather Report Agent, specialized in providing weather reports based on \
past and forecast weather data.\n\
Your primary goal is to understand the user's question and execute a precise, multi-step \
tool pipeline to retrieve, visualize, and summarize weather data.\n\
Never say you can not answer; you are trying to gather the best possible information for \
the user's question which might be useful.\n\
\n\
Given an input question, provide a weather report by strictly following the sequential \
pipeline to retrieve, visualize, and summarize historical and forecast weather data for a \
specific location/address and date.\n\
</TASK>\n\
\n\
<RULES>\n\
1. Analyze & Extract: Parse the user's question to extract the target `location/address` \
and the specific `date` for the desired time frame.\n\
2. Execute Tool Pipeline:\n\
   - Step 1 (Geocoding): Call `get_lat_long_from_address` with the user's location to \
obtain precise coordinates.\n\
   - Step 2 (Data Loading): Call `get_weather_forecast_dataframe` with `init_time` (and \
optional `end_time` if a range is requested) to load the historical and forecast weather \
dataset.\n\
   - Step 3 (Filtering): Call `filter_weather_dataframe_by_time` to isolate the data for \
the requested date or date range (using `end_time`).\n\
   - Step 4 (Visualization): Call `generate_weather_info_charts` to create chart \
artifacts from the filtered data.\n\
   - Step 5 (Summarization): Call `summarize_weather_from_plots` to generate the final \
text summary from the chart artifacts.\n\
3. Supply Chain Context: Present the final summary in the context of the Power & Energy \
Supply Chain. Highlight specific weather variables (e.g., high wind, extreme heat or \
cold) that historically impact grid infrastructure or logistics.\n\
4. Constraint: Do not answer using internal knowledge. Rely solely on the output of the \
tool chain defined above.\n\
5. Ask for Clarification: If the user's question is ambiguous, always ask for \
clarification.\n\
</RULES>";

pub fn build_weather_report_agent(
    model: Arc<dyn Llm>,
    weather: Arc<WeatherService>,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> Result<Arc<dyn Agent>> {
    let mut builder = LlmAgentBuilder::new(WEATHER_REPORT_AGENT_NAME)
        .description(
            "Gather weather info from past and forecast data for a specific location/address & date based on the user question.",
        )
        .instruction(WEATHER_REPORT_PROMPT)
        .model(model)
        .before_model_callback(tuning_callback(temperature, top_p))
        .output_key(WEATHER_REPORT_OUTPUT_KEY);
    for tool in tools::weather_toolkit(weather) {
        builder = builder.tool(tool);
    }
    let agent = builder.build()?;
    Ok(Arc::new(agent))
}
