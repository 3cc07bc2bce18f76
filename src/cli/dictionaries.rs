//! `dictionaries` and `regions` commands

use clap::Args;
use serde_json::json;

use super::{CliError, OutputFormat};
use crate::client::CepikClient;

/// `dictionaries` arguments
#[derive(Args, Debug, Clone)]
pub struct DictionariesArgs {
    /// Dictionary name (e.g. marka, rodzaj-paliwa); all when omitted
    pub name: Option<String>,
}

impl DictionariesArgs {
    /// Print one dictionary or all of them
    pub async fn execute(&self, format: OutputFormat, client: &CepikClient) -> Result<(), CliError> {
        match &self.name {
            Some(name) => {
                let values = client.get_dictionary(name).await;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&json!({ name.as_str(): values }))?)
                    }
                    OutputFormat::Human => {
                        if values.is_empty() {
                            println!("Dictionary '{name}' is empty or unavailable");
                        }
                        for value in values {
                            println!("{value}");
                        }
                    }
                }
            }
            None => {
                let all = client.get_all_dictionaries().await;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&all)?),
                    OutputFormat::Human => {
                        if all.is_empty() {
                            println!("No dictionaries available");
                        }
                        for (name, values) in &all {
                            println!("{name} ({} values)", values.len());
                            for value in values {
                                println!("  {value}");
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Print region codes and names
pub async fn execute_regions(format: OutputFormat, client: &CepikClient) -> Result<(), CliError> {
    let regions = client.get_regions().await;
    match format {
        OutputFormat::Json => {
            let body: Vec<_> = regions
                .iter()
                .map(|(code, name)| json!({ "code": code, "name": name }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Human => {
            for (code, name) in &regions {
                println!("{code}  {name}");
            }
        }
    }
    Ok(())
}
