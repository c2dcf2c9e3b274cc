//! Static catalog of what the builder can convert.

use serde::Serialize;

use super::types::{ExecutionProvider, Precision};

/// Hugging Face architecture names the onnxruntime-genai builder can trace,
/// in the order they are reported to clients.
const SUPPORTED_ARCHITECTURES: &[&str] = &[
    "ChatGLMForConditionalGeneration",
    "ChatGLMModel",
    "Gemma2ForCausalLM",
    "Gemma3ForCausalLM",
    "GemmaForCausalLM",
    "GraniteForCausalLM",
    "LlamaForCausalLM",
    "MistralForCausalLM",
    "NemotronForCausalLM",
    "OlmoForCausalLM",
    "Phi3ForCausalLM",
    "Phi3SmallForCausalLM",
    "Phi3VForCausalLM",
    "PhiForCausalLM",
    "PhiMoEForCausalLM",
    "Qwen2ForCausalLM",
    "Qwen3ForCausalLM",
];

const EXAMPLE_MODELS: &[&str] = &[
    "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
    "microsoft/phi-2",
    "microsoft/Phi-3-mini-4k-instruct",
    "meta-llama/Llama-3.2-1B-Instruct",
    "Qwen/Qwen2.5-0.5B-Instruct",
];

/// Precision/provider pairs known to produce usable models. Advisory only.
const RECOMMENDED_COMBINATIONS: &[(Precision, ExecutionProvider)] = &[
    (Precision::Fp32, ExecutionProvider::Cpu),
    (Precision::Fp32, ExecutionProvider::Cuda),
    (Precision::Fp16, ExecutionProvider::Cuda),
    (Precision::Fp16, ExecutionProvider::Dml),
    (Precision::Int4, ExecutionProvider::Cpu),
    (Precision::Int4, ExecutionProvider::Cuda),
    (Precision::Int4, ExecutionProvider::Dml),
];

/// A precision/provider pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Combination {
    pub precision: Precision,
    pub execution_provider: ExecutionProvider,
}

/// Response body of `GET /models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalog {
    pub architectures: Vec<&'static str>,
    pub precisions: Vec<Precision>,
    pub execution_providers: Vec<ExecutionProvider>,
    pub default_precision: Precision,
    pub default_execution_provider: ExecutionProvider,
    pub recommended_combinations: Vec<Combination>,
    pub examples: Vec<&'static str>,
    pub note: &'static str,
}

/// Ordered architecture names the builder supports.
pub fn list_supported_models() -> Vec<&'static str> {
    SUPPORTED_ARCHITECTURES.to_vec()
}

/// Full catalog served by `GET /models`.
pub fn model_catalog() -> ModelCatalog {
    ModelCatalog {
        architectures: list_supported_models(),
        precisions: Precision::ALL.to_vec(),
        execution_providers: ExecutionProvider::ALL.to_vec(),
        default_precision: Precision::default(),
        default_execution_provider: ExecutionProvider::default(),
        recommended_combinations: RECOMMENDED_COMBINATIONS
            .iter()
            .map(|&(precision, execution_provider)| Combination {
                precision,
                execution_provider,
            })
            .collect(),
        examples: EXAMPLE_MODELS.to_vec(),
        note: "Any hub model whose config.json names one of these architectures should convert. \
               A hub access token is required for every request.",
    }
}
