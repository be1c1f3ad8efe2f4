/// Ops insight agent - NL-to-SQL over the BigQuery consumption table.
///
/// The live table schema is embedded into the instruction at build time so
/// the model never has to guess column names.
use adk_rust::prelude::*;
use anyhow::Result;
use std::sync::Arc;

use crate::model::tuning_callback;
use crate::tools;
use crate::tools::warehouse::Warehouse;

pub const OPS_INSIGHT_AGENT_NAME: &str = "OpsInsightAgent";
pub const OPS_INSIGHT_OUTPUT_KEY: &str = "ops_insight_report";

pub fn ops_insight_instruction(schema: &str) -> String {
    format!(
        "<TASK>\n\
         You are an Expert Data Engineer Agent, specialized in generating SQL queries.\n\
         Your primary goal is to understand the user's question about current power \
         consumption and generation information by querying a BigQuery database.\n\
         Never say you can not answer; you are trying to gather the best possible \
         information for the user's question which might be useful.\n\
         \n\
         Given an input question, create a syntactically correct SQL query and run it \
         against the BigQuery database using the `execute_sql_query` tool.\n\
         </TASK>\n\
         \n\
         <SCHEMA>\n\
         Please make sure you follow the below schema:\n\
         {schema}\n\
         </SCHEMA>\n\
         \n\
         <RULES>\n\
         Please make sure you follow the below instructions:\n\
         1. Valid SQL Query: Your generated query must be valid Google BigQuery SQL. \
         Always use the full table name, including the project ID.\n\
         2. Avoid Guessing Columns: Never guess column names; only use the ones provided \
         in the schema.\n\
         3. Limit Your Query: Unless the user specifies a number of examples they wish to \
         obtain, always limit your query to at most 100 results. You can order the results \
         by the `date` column to return the most recent rows in the database.\n\
         4. Avoid Querying Everything: Never query for all the columns from the table; \
         only ask for the relevant columns given the question.\n\
         5. Double Check: You MUST double check your query before executing it. If you get \
         an error while executing a query, rewrite the query and try again.\n\
         6. Avoid DML Statements: DO NOT make any DML statements (INSERT, UPDATE, DELETE, \
         DROP etc.) to the database.\n\
         7. Tool Usage: You must use the `execute_sql_query` tool, passing the generated \
         SQL query as input.\n\
         8. Stay Internal: Your knowledge is strictly limited to the data within the \
         BigQuery table. Do not include any external information.\n\
         9. Ask for Clarification: If the user's question is ambiguous, always ask for \
         clarification.\n\
         10. Analysis Summary: Interpret the results returned by the tool and provide a \
         concise analysis summary of 100 words or less.\n\
         </RULES>"
    )
}

pub fn build_ops_insight_agent(
    model: Arc<dyn Llm>,
    warehouse: Arc<dyn Warehouse>,
    schema_text: &str,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> Result<Arc<dyn Agent>> {
    let agent = LlmAgentBuilder::new(OPS_INSIGHT_AGENT_NAME)
        .description(
            "Gather the current power consumption and generation information by querying the BigQuery database based on the user question.",
        )
        .instruction(ops_insight_instruction(schema_text))
        .model(model)
        .tool(tools::execute_sql_tool(warehouse))
        .before_model_callback(tuning_callback(temperature, top_p))
        .output_key(OPS_INSIGHT_OUTPUT_KEY)
        .build()?;
    Ok(Arc::new(agent))
}
