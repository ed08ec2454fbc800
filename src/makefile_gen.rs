//! Makefile generator.
//!
//! Renders a [`BuildPlan`] as the rule file consumed by `make`. The output
//! depends only on the plan, so regenerating an unchanged plan yields the
//! same bytes and leaves the rule file untouched on disk.

use shell_quote::{QuoteRefExt, Sh};
use std::fmt::{self, Display, Formatter};

use crate::plan::{BuildPlan, Recipe, Rule};
use executor_env::BUILD_VERBOSITY_ENV;

/// Name of the catch-all prerequisite forcing a rule to re-run.
pub const FORCE_TARGET: &str = "FORCE";

/// Generate the Makefile text for `plan`.
#[must_use]
pub fn generate(plan: &BuildPlan) -> String {
    DisplayPlan(plan).to_string()
}

/// Quote `value` for `sh` and escape it for `make`.
fn quote(value: &str) -> String {
    let bytes: Vec<u8> = value.quoted(Sh);
    let quoted = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug_assert!(false, "shell quoting produced non UTF-8 bytes: {err}");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    escape_make(&quoted)
}

/// Escape `$` so `make` passes it through to the shell.
fn escape_make(value: &str) -> String {
    value.replace('$', "$$")
}

struct DisplayPlan<'a>(&'a BuildPlan);

impl Display for DisplayPlan<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "ifneq ($({BUILD_VERBOSITY_ENV}),)")?;
        writeln!(f, "    SILENCE =")?;
        writeln!(f, "    VERBOSITY = --verbose")?;
        writeln!(f, "else")?;
        writeln!(f, "    SILENCE = @")?;
        writeln!(f, "    VERBOSITY =")?;
        writeln!(f, "endif")?;
        writeln!(f)?;
        writeln!(f, "{FORCE_TARGET}:")?;
        for rule in self.0.rules() {
            writeln!(f)?;
            write!(f, "{}", DisplayRule(rule))?;
        }
        Ok(())
    }
}

struct DisplayRule<'a>(&'a Rule);

impl Display for DisplayRule<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rule = self.0;
        write!(f, "{}:", escape_make(rule.output.as_str()))?;
        for prerequisite in &rule.prerequisites {
            write!(f, " {}", escape_make(prerequisite.as_str()))?;
        }
        if rule.always_rerun {
            write!(f, " {FORCE_TARGET}")?;
        }
        writeln!(f)?;
        writeln!(f, "\t{}", DisplayRecipe(&rule.recipe))
    }
}

struct DisplayRecipe<'a>(&'a Recipe);

impl Display for DisplayRecipe<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let recipe = self.0;
        write!(
            f,
            "$(SILENCE)cd {} && {} $(VERBOSITY)",
            quote(recipe.directory.as_str()),
            quote(&format!("./{}", recipe.driver)),
        )?;
        for arg in recipe.invocation.to_args() {
            write!(f, " {}", quote(&arg))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{BuildAxis, BuildType};
    use crate::config::{Workspace, WorkspaceLayout};
    use crate::declaration::Declaration;
    use crate::graph::TargetGraph;
    use rstest::rstest;

    fn plan_for(root: &str, entries: &[(&str, &[&str])]) -> BuildPlan {
        let workspace = Workspace::new(root, WorkspaceLayout::default());
        let declaration = Declaration::from_entries(
            entries
                .iter()
                .map(|(id, deps)| (*id, deps.iter().map(|d| (*d).to_owned()).collect::<Vec<_>>())),
        );
        let graph = TargetGraph::assemble(&declaration, &workspace)
            .and_then(TargetGraph::into_acyclic)
            .expect("acyclic graph");
        let axis = BuildAxis::new(vec!["gcc".into()], vec![BuildType::Release]);
        BuildPlan::generate(&graph, &axis, &workspace)
    }

    #[rstest]
    fn prelude_defines_verbosity_switch() {
        let text = generate(&plan_for("/repo", &[]));
        let expected = concat!(
            "ifneq ($(KEELSON_BUILD_VERBOSITY),)\n",
            "    SILENCE =\n",
            "    VERBOSITY = --verbose\n",
            "else\n",
            "    SILENCE = @\n",
            "    VERBOSITY =\n",
            "endif\n",
            "\n",
            "FORCE:\n",
        );
        assert!(text.starts_with(expected), "unexpected prelude:\n{text}");
    }

    #[rstest]
    fn rules_render_prerequisites_and_force() {
        let text = generate(&plan_for("/repo", &[("core", &[]), ("net", &["core"])]));
        assert!(text.contains(
            "\n.deps/gcc/release/net.dep: .deps/toolchain-options.check .deps/exports/net.build .deps/gcc/release/core.dep\n\t$(SILENCE)cd "
        ));
        assert!(text.contains(
            "\n.deps/gcc/release/net.tidy: .deps/toolchain-options.check .deps/gcc/release/net.dep FORCE\n"
        ));
        assert!(text.contains("\n.deps/toolchain-options.check: FORCE\n"));
    }

    #[rstest]
    fn recipe_words_survive_shell_parsing() {
        let text = generate(&plan_for("/repo with space", &[("core", &[])]));
        let line = text
            .lines()
            .find(|l| l.starts_with("\t") && l.contains("--test-package") && !l.contains("--gen-tidy-info"))
            .expect("test recipe");
        let command = line
            .trim_start_matches('\t')
            .trim_start_matches("$(SILENCE)")
            .replace(" $(VERBOSITY)", "");
        let words = shlex::split(&command).expect("valid shell");
        assert_eq!(
            words,
            [
                "cd",
                "/repo with space/core",
                "&&",
                "./driver",
                "-c",
                "gcc",
                "-b",
                "release",
                "--test-package"
            ]
        );
    }

    #[rstest]
    fn dollar_signs_are_escaped_for_make() {
        assert_eq!(escape_make("a$b"), "a$$b");
        let quoted = quote("/repo/$HOME");
        assert!(quoted.contains("$$HOME"), "{quoted}");
    }

    #[rstest]
    fn output_is_deterministic() {
        let entries: &[(&str, &[&str])] = &[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])];
        assert_eq!(
            generate(&plan_for("/repo", entries)),
            generate(&plan_for("/repo", entries))
        );
    }
}
