//! Journal retention

use crate::command_exec::CommandSpec;
use crate::runner::StepEnv;
use crate::steps::StepResult;

pub fn vacuum_journal(env: &StepEnv<'_>) -> StepResult {
    let retention = &env.config.journal_retention;
    env.run(&CommandSpec::new("journalctl").arg("--rotate"))?;
    let output = env.run(
        &CommandSpec::new("journalctl").arg(format!("--vacuum-time={}", retention)),
    )?;

    // journalctl reports on stderr
    let freed = vacuum_freed(&output.stderr).or_else(|| vacuum_freed(&output.stdout));
    Ok(match freed {
        Some(amount) => format!("kept {} of journal, freed {}", retention, amount),
        None => format!("journal trimmed to {}", retention),
    })
}

/// Amount from "Vacuuming done, freed 1.2G of archived journals from ..."
pub fn vacuum_freed(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|l| l.split_once("freed "))
        .filter_map(|(_, rest)| rest.split_whitespace().next())
        .last()
        .map(str::to_string)
}
