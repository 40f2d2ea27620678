//! Container runtime freshness check
//!
//! Lists running containers through Docker, escalating through `sudo -S`
//! once when the unprivileged attempt is refused, then flags images that
//! are not on a floating tag. A pinned tag never picks up upstream fixes by
//! itself, so it is surfaced for manual review. This is a freshness
//! heuristic, not a vulnerability scan.

use super::session::{CommandOutput, RemoteSession};
use crate::constants::FLOATING_TAG;
use crate::models::SecureString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const PRESENCE_CMD: &str = "command -v docker >/dev/null 2>&1 && echo 'yes' || echo 'no'";
const LIST_CMD: &str = "docker ps --format '{{.Names}};;{{.Image}}' 2>&1";
const SUDO_LIST_CMD: &str = "sudo -S -p '' docker ps --format '{{.Names}};;{{.Image}}' 2>&1";
const IMAGES_CMD: &str = "docker ps --format '{{.Image}}'";
const SUDO_IMAGES_CMD: &str = "sudo -S -p '' docker ps --format '{{.Image}}'";

pub const ESCALATION_UNAVAILABLE: &str = "escalation unavailable";
pub const ESCALATION_DENIED: &str = "escalation denied: sudo refused access to docker (check sudoers)";
const DAEMON_UNAVAILABLE: &str = "daemon unavailable";

/// Container view of one host
///
/// Invariant: when `has_runtime` is false every count is zero and
/// `outdated_images` is empty. A populated `error` means the counts are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub has_runtime: bool,
    pub error: Option<String>,
    pub containers: usize,
    pub images_total: usize,
    /// Images on a pinned tag, sorted
    pub outdated_images: Vec<String>,
}

impl ContainerState {
    /// No container runtime installed
    pub fn absent() -> Self {
        Self::default()
    }

    /// Runtime present but the check could not complete
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            has_runtime: true,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Runtime never confirmed: the audit stopped early or the presence check failed
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn outdated_count(&self) -> usize {
        self.outdated_images.len()
    }

    pub fn has_stale_images(&self) -> bool {
        !self.outdated_images.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Unprivileged,
    Escalated,
}

/// Classified result of one `docker ps` attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    Listed(String),
    PermissionDenied,
    DaemonUnavailable(String),
}

impl ListOutcome {
    fn daemon_unreachable(lower: &str) -> bool {
        lower.contains("cannot connect to the docker daemon")
            || lower.contains("is the docker daemon running")
    }

    fn daemon_message(output: &CommandOutput) -> String {
        let text = output.combined();
        let text = text.trim();
        if text.is_empty() {
            DAEMON_UNAVAILABLE.to_string()
        } else {
            format!("{}: {}", DAEMON_UNAVAILABLE, text)
        }
    }

    pub fn from_unprivileged(output: &CommandOutput) -> Self {
        let lower = output.combined().to_lowercase();
        if lower.contains("permission denied") {
            ListOutcome::PermissionDenied
        } else if Self::daemon_unreachable(&lower) {
            ListOutcome::DaemonUnavailable(Self::daemon_message(output))
        } else {
            ListOutcome::Listed(output.stdout.clone())
        }
    }

    pub fn from_escalated(output: &CommandOutput) -> Self {
        const REFUSALS: &[&str] = &[
            "permission denied",
            "authentication failure",
            "incorrect password",
            "a password is required",
            "not in the sudoers",
            "sorry, try again",
        ];
        let lower = output.combined().to_lowercase();
        if REFUSALS.iter().any(|marker| lower.contains(marker)) {
            ListOutcome::PermissionDenied
        } else if Self::daemon_unreachable(&lower) {
            ListOutcome::DaemonUnavailable(Self::daemon_message(output))
        } else {
            ListOutcome::Listed(output.stdout.clone())
        }
    }
}

/// Privilege negotiation for the container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationState {
    Unattempted,
    UnprivilegedTried(ListOutcome),
    PrivilegedTried(ListOutcome),
    Resolved { privilege: Privilege, listing: String },
}

/// What the driver must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationStep {
    Attempt(Privilege),
    Resolve { privilege: Privilege, listing: String },
    Done { privilege: Privilege, listing: String },
    Fail(String),
}

impl EscalationState {
    /// Pure transition function; `has_secret` tells whether a sudo secret exists
    pub fn next(self, has_secret: bool) -> EscalationStep {
        use EscalationState::*;
        use ListOutcome::*;

        match self {
            Unattempted => EscalationStep::Attempt(Privilege::Unprivileged),
            UnprivilegedTried(Listed(listing)) => EscalationStep::Resolve {
                privilege: Privilege::Unprivileged,
                listing,
            },
            UnprivilegedTried(PermissionDenied) if has_secret => {
                EscalationStep::Attempt(Privilege::Escalated)
            }
            UnprivilegedTried(PermissionDenied) => {
                EscalationStep::Fail(ESCALATION_UNAVAILABLE.to_string())
            }
            UnprivilegedTried(DaemonUnavailable(message))
            | PrivilegedTried(DaemonUnavailable(message)) => EscalationStep::Fail(message),
            PrivilegedTried(Listed(listing)) => EscalationStep::Resolve {
                privilege: Privilege::Escalated,
                listing,
            },
            PrivilegedTried(PermissionDenied) => EscalationStep::Fail(ESCALATION_DENIED.to_string()),
            Resolved { privilege, listing } => EscalationStep::Done { privilege, listing },
        }
    }
}

async fn run_at(
    session: &dyn RemoteSession,
    privilege: Privilege,
    plain: &str,
    escalated: &str,
    secret: Option<&SecureString>,
) -> Result<CommandOutput, String> {
    let result = match (privilege, secret) {
        (Privilege::Unprivileged, _) => session.execute(plain).await,
        (Privilege::Escalated, Some(secret)) => session.execute_with_input(escalated, secret).await,
        (Privilege::Escalated, None) => return Err(ESCALATION_UNAVAILABLE.to_string()),
    };
    result.map_err(|e| e.to_string())
}

/// Drive the escalation state machine until the listing resolves or fails
async fn negotiate_listing(
    session: &dyn RemoteSession,
    secret: Option<&SecureString>,
) -> Result<(Privilege, String), String> {
    let mut state = EscalationState::Unattempted;
    loop {
        state = match state.next(secret.is_some()) {
            EscalationStep::Attempt(privilege) => {
                let output = run_at(session, privilege, LIST_CMD, SUDO_LIST_CMD, secret).await?;
                match privilege {
                    Privilege::Unprivileged => {
                        let outcome = ListOutcome::from_unprivileged(&output);
                        if outcome == ListOutcome::PermissionDenied {
                            tracing::debug!(host = session.server_name(), "docker refused, trying sudo");
                        }
                        EscalationState::UnprivilegedTried(outcome)
                    }
                    Privilege::Escalated => {
                        EscalationState::PrivilegedTried(ListOutcome::from_escalated(&output))
                    }
                }
            }
            EscalationStep::Resolve { privilege, listing } => {
                EscalationState::Resolved { privilege, listing }
            }
            EscalationStep::Done { privilege, listing } => return Ok((privilege, listing)),
            EscalationStep::Fail(message) => return Err(message),
        };
    }
}

/// Count `name;;image` rows and distinct images
fn parse_container_listing(raw: &str) -> (usize, usize) {
    let mut containers = 0;
    let mut images = BTreeSet::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let Some((name, image)) = line.split_once(";;") else {
            continue;
        };
        let (name, image) = (name.trim(), image.trim());
        if name.is_empty() && image.is_empty() {
            continue;
        }
        containers += 1;
        if !image.is_empty() {
            images.insert(image);
        }
    }
    (containers, images.len())
}

/// Tag of an image reference; `latest` when none is given
///
/// A `:` inside the registry part (`host:5000/app`) is not a tag separator.
pub fn image_tag(image: &str) -> &str {
    match image.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() && !tag.contains('/') => tag,
        _ => FLOATING_TAG,
    }
}

/// Images not on the floating tag, minus the ignore-list, sorted
pub fn stale_images<'a>(
    images: impl IntoIterator<Item = &'a str>,
    ignored: &[String],
) -> Vec<String> {
    images
        .into_iter()
        .filter(|image| !ignored.iter().any(|i| i.as_str() == *image))
        .filter(|image| image_tag(image) != FLOATING_TAG)
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Check the container runtime of the connected host
///
/// Never fails: every error ends up in [`ContainerState::error`].
pub async fn check_containers(
    session: &dyn RemoteSession,
    escalation_secret: Option<&SecureString>,
    ignored_images: &[String],
) -> ContainerState {
    match run_check(session, escalation_secret, ignored_images).await {
        Ok(state) => state,
        Err(message) => {
            tracing::warn!(host = session.server_name(), error = %message, "container check failed");
            ContainerState::failed(message)
        }
    }
}

async fn run_check(
    session: &dyn RemoteSession,
    secret: Option<&SecureString>,
    ignored: &[String],
) -> Result<ContainerState, String> {
    // Runtime presence is unknown until the check answers "yes"
    let presence = match session.execute(PRESENCE_CMD).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(host = session.server_name(), error = %e, "docker presence check failed");
            return Ok(ContainerState::skipped(e.to_string()));
        }
    };
    if presence.stdout.trim() != "yes" {
        return Ok(ContainerState::absent());
    }

    let (privilege, listing) = negotiate_listing(session, secret).await?;
    let (containers, images_total) = parse_container_listing(&listing);
    let mut state = ContainerState {
        has_runtime: true,
        containers,
        images_total,
        ..ContainerState::default()
    };
    if images_total == 0 {
        return Ok(state);
    }

    let images_output = run_at(session, privilege, IMAGES_CMD, SUDO_IMAGES_CMD, secret).await?;
    let images: BTreeSet<&str> = images_output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if images.is_empty() {
        return Ok(state);
    }

    state.outdated_images = stale_images(images, ignored);
    tracing::debug!(
        host = session.server_name(),
        containers = state.containers,
        images = state.images_total,
        outdated = state.outdated_count(),
        escalated = privilege == Privilege::Escalated,
        "container check complete"
    );
    Ok(state)
}
