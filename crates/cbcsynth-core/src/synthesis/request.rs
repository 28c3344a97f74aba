//! Request payload and behavioural constraints for the generative service.

use serde::{Deserialize, Serialize};

use super::shrink::shrink;
use crate::variables::Variable;

/// Style marker asking the model for code only.
pub const STYLE_CODE_ONLY: &str = "emit Java statement block only";

/// Extra instruction attached when the hole is a loop update.
pub const LOOP_UPDATE_HINT: &str =
    "This is a loop update; ensure the variant strictly decreases and the invariant is preserved.";

/// System-level constraints sent with every request.
pub const SYSTEM_PROMPT: &str = r#"You fill holes in Correctness-by-Construction programs verified with KeY.

You receive a JSON object:
  {"variables": [{"name": str, "modifiable": bool, "type": str}, ...],
   "pre_text": str, "post_text": str, "style": str, "is_loop_update": bool}

Produce a Java statement block that, started in any state satisfying pre_text,
ends in a state satisfying post_text.

Constraints:
- Assign only variables whose "modifiable" flag is true. Never write any other variable or array.
- Use only the listed variables and plain Java expressions. No helper methods, imports or class headers.
- Prefer loop-free code unless "is_loop_update" is true.
- Keep every array access within the bounds implied by pre_text.
- If a variant appears (for example variantVar0 = bb - wt), make it strictly decrease.
- Emit every update needed to establish post_text, not the smallest textual change.
- If "style" asks for a statement block only, write code without prose.

Answer with exactly this JSON object and nothing else:
  {"java": "<Java statements>"}
"#;

/// The sole payload sent to the generative service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub variables: Vec<Variable>,
    pub pre_text: String,
    pub post_text: String,
    pub style: String,
    pub is_loop_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl SynthesisRequest {
    /// Build a request, shrinking PRE/POST to at most `max_chars` each.
    pub fn new(
        variables: &[Variable],
        pre: &str,
        post: &str,
        is_loop_update: bool,
        max_chars: usize,
    ) -> Self {
        Self {
            variables: variables.to_vec(),
            pre_text: shrink(pre, max_chars),
            post_text: shrink(post, max_chars),
            style: STYLE_CODE_ONLY.to_string(),
            is_loop_update,
            hint: is_loop_update.then(|| LOOP_UPDATE_HINT.to_string()),
        }
    }

    /// Serialize as the user message of a chat request.
    pub fn to_user_message(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
