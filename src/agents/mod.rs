/// Conversational agent graph for power and energy supply chain analysis.
///
/// One orchestrator fronts five specialists, each exposed to it as a tool:
///
/// - `demand_sense`: Holt-Winters demand forecasts from warehouse history
/// - `ops_insight`: NL-to-SQL over the BigQuery consumption table
/// - `market_pulse`: real-time external signals via Google Search grounding
/// - `weather_report`: five-step Open-Meteo retrieval and charting pipeline
/// - `chart_generator`: declarative chart rendering from report data

pub mod chart_generator;
pub mod demand_sense;
pub mod market_pulse;
pub mod ops_insight;
pub mod orchestrator;
pub mod weather_report;
