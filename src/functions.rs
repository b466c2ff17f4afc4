//! Function-calling layer: the [`AnalysisFunction`] trait, its registry, and
//! argument validation.
//!
//! The completion model decides *whether* to call a function; this module
//! owns *what* happens when it does. Every invocation is validated against
//! the function's declared parameter schema before anything executes, so a
//! bad argument can never leave partial effects behind. Execution failures
//! are captured in the returned [`FunctionCallResult`] rather than raised,
//! keeping one broken call from sinking the whole answer.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{AdvisorError, Result};
use crate::models::{FunctionCallResult, ProjectProfile, ScannedFile};
use crate::registry_client::PackageRegistry;

// ═══════════════════════════════════════════════════════════════════════
// AnalysisFunction Trait
// ═══════════════════════════════════════════════════════════════════════

/// A project-analysis function callable from a conversation.
///
/// Implementations are read-only views over the project profile and its
/// stored files; they must not mutate anything. Parameter schemas use the
/// OpenAI function-calling JSON Schema shape so they can be handed to the
/// completion provider verbatim.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use dep_advisor::error::Result;
/// use dep_advisor::functions::{AnalysisFunction, FunctionContext};
///
/// pub struct DependencyCount;
///
/// #[async_trait]
/// impl AnalysisFunction for DependencyCount {
///     fn name(&self) -> &str { "dependency_count" }
///     fn description(&self) -> &str { "Count declared dependencies" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {}, "required": [] })
///     }
///
///     async fn execute(&self, _args: &Value, ctx: &FunctionContext<'_>) -> Result<Value> {
///         Ok(json!({ "total": ctx.profile.dependencies.len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait AnalysisFunction: Send + Sync {
    /// Function name as exposed to the model (snake_case identifier).
    fn name(&self) -> &str;

    /// One-line description used for model tool selection.
    fn description(&self) -> &str;

    /// OpenAI function-calling JSON Schema for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the function against the project in `ctx`. Arguments have
    /// already passed schema validation.
    async fn execute(&self, args: &Value, ctx: &FunctionContext<'_>) -> Result<Value>;
}

/// Per-invocation view of the project a function runs against.
pub struct FunctionContext<'a> {
    pub profile: &'a ProjectProfile,
    pub files: &'a [ScannedFile],
    pub registry: &'a dyn PackageRegistry,
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable analysis functions.
pub struct FunctionRegistry {
    functions: Vec<Box<dyn AnalysisFunction>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
        }
    }

    /// Create a registry pre-loaded with the built-in analysis functions.
    pub fn with_builtins() -> Self {
        use crate::analysis::{
            CheckCompatibility, FindLibraryReferences, ListIncompatibleLibraries,
            SuggestLibraryUpgrades,
        };

        let mut registry = Self::new();
        registry.register(Box::new(FindLibraryReferences::new()));
        registry.register(Box::new(CheckCompatibility));
        registry.register(Box::new(ListIncompatibleLibraries));
        registry.register(Box::new(SuggestLibraryUpgrades));
        registry
    }

    /// Register a function.
    pub fn register(&mut self, function: Box<dyn AnalysisFunction>) {
        self.functions.push(function);
    }

    /// Find a function by name.
    pub fn find(&self, name: &str) -> Option<&dyn AnalysisFunction> {
        self.functions
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// Names of all registered functions, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name()).collect()
    }

    /// OpenAI `tools` array describing every registered function.
    pub fn tool_schemas(&self) -> Vec<Value> {
        self.functions
            .iter()
            .map(|f| {
                json!({
                    "type": "function",
                    "function": {
                        "name": f.name(),
                        "description": f.description(),
                        "parameters": f.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Validate and run one function call.
    ///
    /// An unknown name or an argument that fails schema validation is an
    /// error — nothing executes. A function that runs and fails comes back
    /// as `Ok` with `success = false` and the failure message attached,
    /// except for argument problems the function itself detects, which stay
    /// hard errors.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &FunctionContext<'_>,
    ) -> Result<FunctionCallResult> {
        let Some(function) = self.find(name) else {
            return Err(AdvisorError::UnknownFunction(name.to_string()));
        };

        validate_arguments(name, &function.parameters_schema(), &arguments)?;

        match function.execute(&arguments, ctx).await {
            Ok(payload) => Ok(FunctionCallResult {
                function_name: name.to_string(),
                arguments,
                result_payload: payload,
                success: true,
                error_message: None,
            }),
            Err(err @ AdvisorError::InvalidArgument { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(function = name, error = %err, "function execution failed");
                Ok(FunctionCallResult {
                    function_name: name.to_string(),
                    arguments,
                    result_payload: Value::Null,
                    success: false,
                    error_message: Some(err.to_string()),
                })
            }
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Argument validation
// ═══════════════════════════════════════════════════════════════════════

/// Check an arguments object against a function's parameter schema:
/// required keys present, no unexpected keys, declared types respected,
/// required strings non-empty.
fn validate_arguments(function: &str, schema: &Value, args: &Value) -> Result<()> {
    let Some(args_map) = args.as_object() else {
        return Err(AdvisorError::invalid_argument(
            function,
            "arguments must be a JSON object",
        ));
    };

    let empty = serde_json::Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for key in &required {
        match args_map.get(*key) {
            None => {
                return Err(AdvisorError::invalid_argument(
                    function,
                    format!("missing required argument '{}'", key),
                ));
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(AdvisorError::invalid_argument(
                    function,
                    format!("argument '{}' must not be empty", key),
                ));
            }
            Some(_) => {}
        }
    }

    for (key, value) in args_map {
        let Some(spec) = properties.get(key) else {
            return Err(AdvisorError::invalid_argument(
                function,
                format!("unexpected argument '{}'", key),
            ));
        };
        if let Some(expected) = spec.get("type").and_then(Value::as_str) {
            let matches = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !matches {
                return Err(AdvisorError::invalid_argument(
                    function,
                    format!("argument '{}' must be a {}", key, expected),
                ));
            }
        }
    }

    Ok(())
}
