use std::collections::HashMap;

use crate::error::GaleError;

/// Step-by-step solve prompt for structured (JSON dict) answers.
/// `<problem>` is substituted; `.replace` is used rather than a formatting
/// macro because the template itself is full of LaTeX braces.
const SOLVE_JSON: &str = r#"# Task Introduction
Please reason through the problem step by step, and place your final answer under the final_answer key.

# Output Format Requirements
Output a dictionary with two keys: analysis and final_answer.
Please provide your analysis of the problem under the analysis key.

For your final_answer:
1. Use strict mathematical notation in LaTeX format, enclosed within '$' symbols.
2. Avoid natural language within mathematical expressions.
3. ALWAYS use the most standard mathematical notation for your answer type:
   - For equations: $x = 5$
   - For ranges/bounds: Use interval notation like $[a,b]$, $(a,b)$, $[a,\infty)$ INSTEAD OF inequality notation
   - For sets: $\{x : P(x)\}$ or $\{1,2,3\}$
   - For systems: Use multiple equations like $\begin{cases} x + y = 1 \\ x - y = 3 \end{cases}$
   - For vectors: $\vec{v} = (1, 2, 3)$ or $\begin{pmatrix} 1 \\ 2 \\ 3 \end{pmatrix}$
   - For matrices: $\begin{pmatrix} 1 & 2 \\ 3 & 4 \end{pmatrix}$

IMPORTANT FOR CORRECT NOTATION AND FORMATTING:
- When expressing ranges (like "x is greater than or equal to 3/4"):
  * CORRECT: $[\frac{3}{4},\infty)$ (interval notation)
  * AVOID: $x \geq \frac{3}{4}$ (inequality notation)
- For proper JSON escaping in LaTeX:
  * Use double backslashes (\\) for all LaTeX commands
  * Example: Write $[\\frac{3}{4},\\infty)$ instead of $[\frac{3}{4},\infty)$

# Input
<problem>

# Output
"#;

/// Free-text variant: final answer inside `\boxed{}` instead of a JSON dict.
const SOLVE_BOXED: &str = r#"# Task Introduction
Please reason through the problem step by step, and put your final answer within \boxed{}

For your answer:
1. Use strict mathematical notation in LaTeX format, enclosed within '$' symbols.
2. Avoid natural language within mathematical expressions.
3. ALWAYS use the most standard mathematical notation for your answer type:
   - For equations: $x = 5$
   - For ranges/bounds: Use interval notation like $[a,b]$, $(a,b)$, $[a,\infty)$ INSTEAD OF inequality notation
   - For sets: $\{x : P(x)\}$ or $\{1,2,3\}$
   - For systems: Use multiple equations like $\begin{cases} x + y = 1 \\ x - y = 3 \end{cases}$
   - For vectors: $\vec{v} = (1, 2, 3)$ or $\begin{pmatrix} 1 \\ 2 \\ 3 \end{pmatrix}$
   - For matrices: $\begin{pmatrix} 1 & 2 \\ 3 & 4 \end{pmatrix}$

# Input
<problem>

# Output
"#;

/// Second-pass prompt: solve provided sub-questions first, then the
/// original problem. `{problem}` and `{sub_questions}` are substituted.
const VERIFY: &str = r#"# Task Introduction
Please solve the sub-problems step by step based on the provided sub-questions, and then solve the original problem.

# Output Format Requirements
Output a dictionary with two keys: analysis, final_answer
Please put your analysis of the problem under the analysis key.
Please put your final answer to the problem under the final_answer key.

# Input
Original problem: {problem}
Sub-questions: {sub_questions}

# Output
"#;

/// Equivalence judge: given a ground-truth expression and a candidate,
/// answer exactly `true` or `false`. `<gt>` and `<ca>` are substituted.
const EQUIV_JUDGE: &str = r#"You are an expert judge of mathematical expression equivalence.

You are given two LaTeX expressions at once:
# ground truth
<gt>

# current answer
<ca>

Follow the three steps below and output only `true` or `false`:

1. **Parse the meaning**
   Convert each expression into its internal semantic structure, ignoring layout, whitespace, `\left...\right`, optional `+` signs, and other formatting differences.

2. **Normalize the representation**
   - Unify interval notation, fixing endpoints and openness;
   - Unify set element order and remove duplicates;
   - Unify symbols: treat `∞`, `\infty`, `+∞` as the same object;
   - Complete any elided symbols according to standard mathematical convention.

3. **Compare**
   - If the two normalized results are identical, output `true`;
   - Otherwise output `false`.

Do not output anything besides `true` / `false`.
"#;

/// Strategy-analysis persona, used as a system prompt: dissect the problem
/// and outline the solution approach without computing the answer.
const ANALYSIS: &str = r#"# Role Definition

You are a professional "Mathematical Problem Analysis Expert," specializing in dissecting mathematical problems and outlining solution strategies. Your strength lies in identifying the core mathematical concepts and appropriate techniques, and providing users with a clear breakdown of the reasoning process rather than computing the final answer.

# Task Definition

Whenever a user presents a mathematical problem, you should:
1. Identify the key mathematical concepts, formulas, or theorems required to solve the problem.
2. Analyze the direction and strategy for approaching the problem.
3. Offer a clear sequence of thought steps and methodological guidance.
4. Explain how to decompose a complex problem into simpler, manageable parts.
5. Handle various types of mathematical questions—such as trigonometric simplification, calculus, algebraic equations, and more—by focusing exclusively on analysis and strategy rather than on performing calculations or providing the final result.

Note: Do not include any calculation steps or final numeric answers; only supply the analysis methodology.

# Output Format Requirements

Your response should be concise and presented in coherent paragraphs (without structured headings), including:

- The essential mathematical knowledge points and identities needed.
- How to break the problem into easier-to-handle components.
- The key steps and reasoning pathways for solving the problem.
- General methodological tips applicable to this category of problems."#;

/// Named prompt templates, injected into row preparation instead of being
/// referenced as ambient constants. Callers may override or add templates
/// before handing the registry to a pipeline stage.
pub struct PromptRegistry {
    templates: HashMap<String, String>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptRegistry {
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        for (name, text) in [
            ("solve_json", SOLVE_JSON),
            ("solve_boxed", SOLVE_BOXED),
            ("verify", VERIFY),
            ("equiv_judge", EQUIV_JUDGE),
            ("analysis", ANALYSIS),
        ] {
            templates.insert(name.to_string(), text.to_string());
        }
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Result<&str, GaleError> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| GaleError::UnknownPrompt(name.to_string()))
    }

    /// Replace or add a template.
    pub fn set(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    /// Render a solve-style template (`solve_json` or `solve_boxed`).
    pub fn solve_prompt(&self, template: &str, question: &str) -> Result<String, GaleError> {
        Ok(self.get(template)?.replace("<problem>", question))
    }

    /// Render the sub-question verification template.
    pub fn verify_prompt(
        &self,
        question: &str,
        sub_questions: &str,
    ) -> Result<String, GaleError> {
        Ok(self
            .get("verify")?
            .replace("{problem}", question)
            .replace("{sub_questions}", sub_questions))
    }

    /// Render the equivalence-judge template for one gt/candidate pair.
    pub fn judge_prompt(&self, reference: &str, candidate: &str) -> Result<String, GaleError> {
        Ok(self
            .get("equiv_judge")?
            .replace("<gt>", reference)
            .replace("<ca>", candidate))
    }

    /// The strategy-analysis persona, used as a system prompt.
    pub fn analysis_persona(&self) -> Result<&str, GaleError> {
        self.get("analysis")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_prompt_substitutes_problem() {
        let registry = PromptRegistry::builtin();
        let rendered = registry.solve_prompt("solve_json", "What is 2+2?").unwrap();
        assert!(rendered.contains("What is 2+2?"));
        assert!(!rendered.contains("<problem>"));
        // LaTeX braces in the template must survive substitution
        assert!(rendered.contains(r"$\begin{cases}"));
    }

    #[test]
    fn verify_prompt_substitutes_both_fields() {
        let registry = PromptRegistry::builtin();
        let rendered = registry
            .verify_prompt("original problem", "q1\nq2")
            .unwrap();
        assert!(rendered.contains("Original problem: original problem"));
        assert!(rendered.contains("Sub-questions: q1\nq2"));
    }

    #[test]
    fn judge_prompt_substitutes_pair() {
        let registry = PromptRegistry::builtin();
        let rendered = registry.judge_prompt("$4$", "$2+2$").unwrap();
        assert!(rendered.contains("$4$"));
        assert!(rendered.contains("$2+2$"));
        assert!(!rendered.contains("<gt>"));
        assert!(!rendered.contains("<ca>"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let registry = PromptRegistry::builtin();
        let err = registry.get("nonexistent").unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn overrides_take_effect() {
        let mut registry = PromptRegistry::builtin();
        registry.set("solve_json", "custom: <problem>");
        assert_eq!(
            registry.solve_prompt("solve_json", "x").unwrap(),
            "custom: x"
        );
    }
}
