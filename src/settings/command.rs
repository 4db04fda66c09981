use tracing::warn;

use super::{Selection, SettingsError, SettingsFacade, SettingsService, SettingsView};

/// Shown before exiting when the caller may not touch backup settings.
pub const PRIVILEGE_NOTICE: &str =
    "nullbak must run as a privileged user to manage backup settings.";

/// A user request against the backup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsAction {
    Show,
    Enable,
    Disable,
    Select(String),
}

/// How a settings request ended.
#[derive(Debug)]
pub enum SettingsOutcome {
    Applied {
        view: SettingsView,
        /// Set for [`SettingsAction::Select`] only.
        selection: Option<Selection>,
    },
    /// The caller lacks privileges. Fatal: the command stops with a failure
    /// status after showing [`PRIVILEGE_NOTICE`].
    Denied(SettingsError),
}

impl SettingsOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Applied { .. } => 0,
            Self::Denied(_) => 1,
        }
    }
}

/// Load the settings from `service` and apply `action`.
///
/// A privilege denial at any step becomes [`SettingsOutcome::Denied`]; every
/// other failure is returned as an error.
pub fn run<S: SettingsService>(
    service: S,
    action: SettingsAction,
) -> Result<SettingsOutcome, SettingsError> {
    match apply(service, action) {
        Ok((view, selection)) => Ok(SettingsOutcome::Applied { view, selection }),
        Err(e) if e.is_privilege_denied() => {
            warn!(error = %e, "Settings request denied");
            Ok(SettingsOutcome::Denied(e))
        }
        Err(e) => Err(e),
    }
}

fn apply<S: SettingsService>(
    service: S,
    action: SettingsAction,
) -> Result<(SettingsView, Option<Selection>), SettingsError> {
    let mut facade = SettingsFacade::load(service)?;

    let selection = match action {
        SettingsAction::Show => None,
        SettingsAction::Enable => {
            facade.set_enabled(true)?;
            None
        }
        SettingsAction::Disable => {
            facade.set_enabled(false)?;
            None
        }
        SettingsAction::Select(name) => Some(facade.select(&name)?),
    };

    Ok((facade.view().clone(), selection))
}
