//! Prompt Providers
//!
//! A provider owns one or more named prompts. The built-in provider holds a
//! fixed registry of templates; rendering substitutes `{name}` placeholders
//! with the caller-supplied argument values. Missing required arguments are
//! the caller's error; missing optional arguments substitute as empty.

use crate::protocol::{
    ContentBlock, PromptArgument, PromptDefinition, PromptMessage, PromptsGetResult,
};
use std::collections::HashMap;

/// Prompt provider failures, mapped to protocol errors by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// No prompt with this name (-32601).
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    /// A required argument was not supplied (-32602).
    #[error("Missing required argument '{argument}' for prompt '{prompt}'")]
    MissingArgument { prompt: String, argument: String },
}

/// Trait for prompt providers.
pub trait PromptProvider: Send + Sync {
    /// Whether this provider owns the named prompt.
    fn can_handle(&self, name: &str) -> bool;

    /// Enumerate every prompt this provider owns.
    fn list_prompts(&self) -> Vec<PromptDefinition>;

    /// Render one prompt with the given arguments.
    fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<PromptsGetResult, PromptError>;
}

struct Template {
    name: &'static str,
    description: &'static str,
    arguments: &'static [(&'static str, &'static str, bool)],
    body: &'static str,
}

/// The fixed built-in prompt registry.
const TEMPLATES: &[Template] = &[
    Template {
        name: "summarize-file",
        description: "Summarize the contents of one resource file",
        arguments: &[
            ("uri", "Resource URI to summarize", true),
            ("focus", "Optional aspect to focus on", false),
        ],
        body: "Read the resource at {uri} and produce a concise summary. \
               If a focus is given, prioritize it: {focus}",
    },
    Template {
        name: "explain-error",
        description: "Explain a tool error and suggest a fix",
        arguments: &[
            ("error", "The error message to explain", true),
            ("context", "What was being attempted", false),
        ],
        body: "A tool call failed with this error:\n\n{error}\n\n\
               Context: {context}\n\n\
               Explain what went wrong and suggest the corrected call.",
    },
    Template {
        name: "tool-usage",
        description: "How to drive the built-in tools effectively",
        arguments: &[("tool", "Restrict the guide to one tool", false)],
        body: "Describe how to use the available tools. If a tool name is \
               given, restrict the guide to it: {tool}. Every built-in tool \
               takes an 'action' argument selecting the operation; list the \
               actions, their required arguments, and one example call each.",
    },
];

/// Built-in prompt provider over the fixed template registry.
#[derive(Debug, Default)]
pub struct BuiltinPromptProvider;

impl BuiltinPromptProvider {
    fn render(template: &Template, arguments: &HashMap<String, String>) -> String {
        let mut body = template.body.to_string();
        for (name, _, _) in template.arguments {
            let value = arguments.get(*name).map(String::as_str).unwrap_or("");
            body = body.replace(&format!("{{{}}}", name), value);
        }
        body
    }
}

impl PromptProvider for BuiltinPromptProvider {
    fn can_handle(&self, name: &str) -> bool {
        TEMPLATES.iter().any(|t| t.name == name)
    }

    fn list_prompts(&self) -> Vec<PromptDefinition> {
        TEMPLATES
            .iter()
            .map(|t| PromptDefinition {
                name: t.name.to_string(),
                description: t.description.to_string(),
                arguments: Some(
                    t.arguments
                        .iter()
                        .map(|(name, description, required)| PromptArgument {
                            name: name.to_string(),
                            description: Some(description.to_string()),
                            required: *required,
                        })
                        .collect(),
                ),
            })
            .collect()
    }

    fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<PromptsGetResult, PromptError> {
        let template = TEMPLATES
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| PromptError::UnknownPrompt(name.to_string()))?;

        for (arg_name, _, required) in template.arguments {
            if *required && !arguments.contains_key(*arg_name) {
                return Err(PromptError::MissingArgument {
                    prompt: name.to_string(),
                    argument: (*arg_name).to_string(),
                });
            }
        }

        Ok(PromptsGetResult {
            description: Some(template.description.to_string()),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ContentBlock::text(Self::render(template, arguments)),
            }],
        })
    }
}
