// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the interactive write mode.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use ualink_opcua::OpcUaClient;

use crate::config::WriteTarget;
use crate::error::BinResult;
use crate::runtime::Harness;
use crate::shutdown::ShutdownCoordinator;

/// Executes the `interactive` command on a connected harness.
pub async fn interactive(harness: &Harness) -> BinResult<()> {
    let config = harness.config();
    let menu = WriteMenu::new(
        harness.client(),
        &config.harness.write_targets,
        config.harness.write_settle,
    );
    let stdin = BufReader::new(tokio::io::stdin());
    menu.run(stdin, &mut std::io::stdout(), harness.shutdown())
        .await
}

// =============================================================================
// WriteMenu
// =============================================================================

/// What a line typed at the menu prompt selects.
#[derive(Debug, PartialEq, Eq)]
pub enum MenuChoice<'a> {
    /// Leave the menu.
    Quit,
    /// Write to this target.
    Target(&'a WriteTarget),
    /// Unknown input.
    Invalid,
}

/// Numbered menu of write targets.
///
/// Each round shows the current value, prompts for a new one, writes it
/// with the target's data type, waits `settle` and shows the value again.
pub struct WriteMenu<'a> {
    client: &'a OpcUaClient,
    targets: &'a [WriteTarget],
    settle: Duration,
}

impl<'a> WriteMenu<'a> {
    /// Creates a menu over `targets`.
    pub fn new(client: &'a OpcUaClient, targets: &'a [WriteTarget], settle: Duration) -> Self {
        Self {
            client,
            targets,
            settle,
        }
    }

    /// Menu lines, numbered from 1.
    pub fn render(&self) -> String {
        let mut text = String::from("Available nodes:\n");
        for (i, target) in self.targets.iter().enumerate() {
            text.push_str(&format!("{}. {} ({})\n", i + 1, target.name, target.node));
        }
        text
    }

    /// Interprets one line of input.
    pub fn select(&self, input: &str) -> MenuChoice<'a> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("q") {
            return MenuChoice::Quit;
        }
        match input.parse::<usize>() {
            Ok(n) if (1..=self.targets.len()).contains(&n) => MenuChoice::Target(&self.targets[n - 1]),
            _ => MenuChoice::Invalid,
        }
    }

    /// Runs the menu until `q`, end of input or shutdown.
    pub async fn run<R, W>(
        &self,
        input: R,
        output: &mut W,
        shutdown: &ShutdownCoordinator,
    ) -> BinResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        writeln!(output, "Interactive write mode")?;
        writeln!(output, "======================")?;
        writeln!(output, "Enter new values for the nodes below (q = quit)")?;
        writeln!(output)?;

        loop {
            write!(output, "{}", self.render())?;
            writeln!(output)?;
            write!(
                output,
                "Which node do you want to change? (1-{}, q = quit): ",
                self.targets.len()
            )?;
            output.flush()?;

            let Some(choice) = next_line(&mut lines, shutdown).await? else {
                break;
            };

            match self.select(&choice) {
                MenuChoice::Quit => break,
                MenuChoice::Invalid => writeln!(output, "✗ Invalid choice: {}", choice.trim())?,
                MenuChoice::Target(target) => {
                    if !self.edit(target, &mut lines, output, shutdown).await? {
                        break;
                    }
                }
            }
            writeln!(output)?;
        }

        writeln!(output, "Leaving interactive write mode")?;
        Ok(())
    }

    /// One read/prompt/write/read round. Returns `false` when input ended.
    async fn edit<R, W>(
        &self,
        target: &WriteTarget,
        lines: &mut Lines<R>,
        output: &mut W,
        shutdown: &ShutdownCoordinator,
    ) -> BinResult<bool>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let node = target.node_id()?;

        self.show_value("Current value", target, output).await?;

        write!(output, "New value ({}): ", target.data_type)?;
        output.flush()?;
        let Some(text) = next_line(lines, shutdown).await? else {
            return Ok(false);
        };
        let text = text.trim();
        if text.is_empty() {
            writeln!(output, "No value entered, nothing written")?;
            return Ok(true);
        }

        match self.client.write_typed(&node, text, &target.data_type).await {
            Ok(result) if result.is_good() => {
                writeln!(output, "  ✓ {} = {} written", target.node, text)?
            }
            Ok(result) => writeln!(output, "  ✗ {} write rejected - Status: {}", target.node, result.status)?,
            Err(e) => writeln!(output, "  ✗ {} write failed: {}", target.node, e)?,
        }

        tokio::time::sleep(self.settle).await;
        self.show_value("Updated value", target, output).await?;
        Ok(true)
    }

    async fn show_value<W: Write>(
        &self,
        label: &str,
        target: &WriteTarget,
        output: &mut W,
    ) -> BinResult<()> {
        let node = target.node_id()?;
        match self.client.read_value(&node).await {
            Ok(result) if result.is_good() => writeln!(output, "{}: {}", label, result.value)?,
            Ok(result) => writeln!(output, "{}: unavailable ({})", label, result.status)?,
            Err(e) => writeln!(output, "{}: read failed: {}", label, e)?,
        }
        Ok(())
    }
}

async fn next_line<R>(
    lines: &mut Lines<R>,
    shutdown: &ShutdownCoordinator,
) -> BinResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = shutdown.wait() => Ok(None),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{HarnessConfig, HarnessSettings};

    fn offline_client() -> OpcUaClient {
        OpcUaClient::new(HarnessConfig::default().client_config())
    }

    async fn run_menu(client: &OpcUaClient, input: &str) -> String {
        let targets = HarnessSettings::default().write_targets;
        let menu = WriteMenu::new(client, &targets, Duration::ZERO);
        let mut output = Vec::new();
        menu.run(input.as_bytes(), &mut output, &ShutdownCoordinator::new())
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_render_and_select() {
        let client = offline_client();
        let targets = HarnessSettings::default().write_targets;
        let menu = WriteMenu::new(&client, &targets, Duration::ZERO);

        let text = menu.render();
        assert!(text.contains("1. Static Boolean (ns=3;s=Demo.Static.Scalar.Boolean)"));
        assert!(text.contains("4. Static UInt32 (ns=3;s=Demo.Static.Scalar.UInt32)"));

        assert_eq!(menu.select("Q"), MenuChoice::Quit);
        assert_eq!(menu.select(" 2 "), MenuChoice::Target(&targets[1]));
        assert_eq!(menu.select("0"), MenuChoice::Invalid);
        assert_eq!(menu.select("5"), MenuChoice::Invalid);
        assert_eq!(menu.select("two"), MenuChoice::Invalid);
    }

    #[tokio::test]
    async fn test_quit_immediately() {
        let output = run_menu(&offline_client(), "q\n").await;
        assert!(output.contains("Which node do you want to change? (1-4, q = quit)"));
        assert!(output.ends_with("Leaving interactive write mode\n"));
    }

    #[tokio::test]
    async fn test_invalid_choice_then_end_of_input() {
        let output = run_menu(&offline_client(), "9\n").await;
        assert!(output.contains("✗ Invalid choice: 9"));
        assert!(output.contains("Leaving interactive write mode"));
    }

    #[tokio::test]
    async fn test_write_round_reports_errors_when_offline() {
        let output = run_menu(&offline_client(), "1\ntrue\nq\n").await;
        assert!(output.contains("Current value: read failed"));
        assert!(output.contains("ns=3;s=Demo.Static.Scalar.Boolean write failed"));
        assert!(output.contains("Updated value: read failed"));
    }

    #[tokio::test]
    async fn test_unparsable_value() {
        let output = run_menu(&offline_client(), "2\nlots\nq\n").await;
        assert!(output.contains("ns=3;s=Demo.Dynamic.Scalar.UInt32 write failed"));
    }

    #[tokio::test]
    async fn test_empty_value_skips_write() {
        let client = offline_client();
        let output = run_menu(&client, "4\n\nq\n").await;
        assert!(output.contains("No value entered, nothing written"));
        assert_eq!(client.stats().writes(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_menu() {
        let client = offline_client();
        let targets = HarnessSettings::default().write_targets;
        let menu = WriteMenu::new(&client, &targets, Duration::ZERO);
        let shutdown = ShutdownCoordinator::new();
        shutdown.initiate_shutdown();

        // A reader that never yields a line.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut output = Vec::new();
        menu.run(BufReader::new(reader), &mut output, &shutdown)
            .await
            .unwrap();
        assert!(String::from_utf8(output).unwrap().contains("Leaving"));
    }
}
