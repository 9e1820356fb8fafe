//! Terminal presentation: plan and diff tables, the confirmation prompt and
//! the transfer progress bar.

use colored::{Color, Colorize};
use dialoguer::{Confirm as Prompt, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};

use crate::diff::{Category, DiffResult};
use crate::location::Endpoint;
use crate::plan::{Action, Confirm, CopyPlan};
use crate::transfer::Progress;

fn paint(text: &str, color: Option<Color>, colors: bool) -> String {
    match color {
        Some(color) if colors => text.color(color).to_string(),
        _ => text.to_string(),
    }
}

fn action_style(action: Action) -> (&'static str, Option<Color>) {
    match action {
        Action::Create => ("->", Some(Color::Green)),
        Action::Overwrite => ("=>", Some(Color::Yellow)),
        Action::Skip => ("==", None),
    }
}

/// One row per plan entry: `source  ->  dest`, columns aligned.
///
/// `->` creates, `=>` overwrites, `==` skips. Destination-only files a relaxed
/// plan leaves alone are listed last with `<-`.
pub fn render_plan(plan: &CopyPlan, colors: bool) -> String {
    let rows: Vec<(String, &str, Option<Color>, String)> = plan
        .entries()
        .iter()
        .map(|e| {
            let (symbol, color) = action_style(e.action);
            (
                plan.source().qualified(&e.path),
                symbol,
                color,
                plan.dest().qualified(&e.path),
            )
        })
        .chain(plan.untouched().iter().map(|p| {
            (
                String::new(),
                Category::OnlyInB.symbol(),
                Some(Color::Magenta),
                plan.dest().qualified(p),
            )
        }))
        .collect();
    let width = rows.iter().map(|r| r.0.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for (left, symbol, color, right) in rows {
        let line = format!("{left:<width$}  {symbol}  {right}");
        let line = if color.is_none() && colors {
            line.dimmed().to_string()
        } else {
            paint(&line, color, colors)
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn category_color(category: Category) -> Option<Color> {
    match category {
        Category::Equal => None,
        Category::Changed => Some(Color::Yellow),
        Category::Unknown => Some(Color::Cyan),
        Category::OnlyInA => Some(Color::Green),
        Category::OnlyInB => Some(Color::Magenta),
    }
}

/// Three columns: path in A, category symbol, path in B. One-sided paths
/// leave the other column empty.
pub fn render_diff(diff: &DiffResult, a: &Endpoint, b: &Endpoint, colors: bool) -> String {
    let rows: Vec<(String, Category, String)> = diff
        .iter()
        .map(|(category, path)| {
            let left = match category {
                Category::OnlyInB => String::new(),
                _ => a.qualified(path),
            };
            let right = match category {
                Category::OnlyInA => String::new(),
                _ => b.qualified(path),
            };
            (left, category, right)
        })
        .collect();
    let width = rows.iter().map(|r| r.0.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for (left, category, right) in rows {
        let line = format!("{left:<width$}  {}  {right}", category.symbol());
        out.push_str(paint(line.trim_end(), category_color(category), colors).as_str());
        out.push('\n');
    }
    if !diff.dest_only_observed() {
        out.push_str(&paint(
            "(files that exist only in the second location are not shown)\n",
            None,
            colors,
        ));
    }
    out
}

/// The production [`Confirm`]: print the plan, then ask on the terminal.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirm {
    pub colors: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, plan: &CopyPlan) -> bool {
        print!("{}", render_plan(plan, self.colors));
        ask("Proceed?")
    }
}

/// Yes/no question on the terminal, defaulting to no. A prompt that cannot
/// be shown (no tty) counts as no.
pub fn ask(question: &str) -> bool {
    let prompt = Prompt::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(false)
        .interact();
    match prompt {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(error = %e, "confirmation prompt failed");
            false
        }
    }
}

/// Progress bar fed by executor callbacks; hidden when disabled.
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    pub fn new(total: usize, enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {pos}/{len} {wide_msg}")
            {
                bar.set_style(style.progress_chars("█▉░"));
            }
            bar
        });
        Self { bar }
    }

    pub fn update(&self, progress: Progress<'_>) {
        if let Some(bar) = &self.bar {
            bar.set_length(progress.total as u64);
            bar.set_position(progress.done as u64);
            if let Some(path) = progress.path {
                bar.set_message(path.display().to_string());
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffBackend, ExistenceDiff, HashDiff};
    use crate::location::{Location, ManifestEntry};
    use crate::plan::{Direction, Policy, plan_actions};

    fn sample_plan() -> CopyPlan {
        let src = Endpoint::local("src");
        let dst = Endpoint::remote("box", "/dst");
        let a = Location::new(
            src.clone(),
            vec![
                ManifestEntry::with_checksum("new.txt", "1"),
                ManifestEntry::with_checksum("same.txt", "2"),
                ManifestEntry::with_checksum("changed.txt", "3"),
            ],
        )
        .unwrap();
        let b = Location::new(
            dst.clone(),
            vec![
                ManifestEntry::with_checksum("same.txt", "2"),
                ManifestEntry::with_checksum("changed.txt", "4"),
                ManifestEntry::with_checksum("extra.txt", "5"),
            ],
        )
        .unwrap();
        let diff = HashDiff.diff(&a, &b).unwrap();
        let policy = Policy {
            direction: Direction::Relaxed,
            ..Policy::default()
        };
        plan_actions(&diff, &src, &dst, policy).unwrap()
    }

    #[test]
    fn test_render_plan_plain() {
        let text = render_plan(&sample_plan(), false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "src/changed.txt  =>  box:/dst/changed.txt",
                "src/new.txt      ->  box:/dst/new.txt",
                "src/same.txt     ==  box:/dst/same.txt",
                "                 <-  box:/dst/extra.txt",
            ]
        );
    }

    #[test]
    fn test_render_diff_plain() {
        let a = Location::from_paths(Endpoint::local("a"), ["x", "both"]).unwrap();
        let b = Location::from_paths(Endpoint::local("b"), ["both", "y"]).unwrap();
        let diff = ExistenceDiff.diff(&a, &b).unwrap();
        let text = render_diff(&diff, a.endpoint(), b.endpoint(), false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["a/both  ?=  b/both", "a/x     ->", "        <-  b/y"]);
    }

    #[test]
    fn test_hidden_progress_is_inert() {
        let progress = TransferProgress::new(3, false);
        progress.update(Progress {
            done: 1,
            total: 3,
            path: None,
        });
        progress.finish();
    }
}
