use anyhow::Result;
use async_trait::async_trait;

pub mod plan;
pub mod provision;
pub mod teardown;
pub mod template;

#[async_trait]
pub trait Command {
    async fn run(&self) -> Result<()>;
}

pub trait IntoCommand {
    fn into_command(self) -> Box<dyn Command>;
}

impl IntoCommand for crate::cli::Command {
    fn into_command(self) -> Box<dyn Command> {
        match self {
            crate::cli::Command::Provision(provision_options) => {
                Box::new(provision::ProvisionCommand { provision_options })
            }
            crate::cli::Command::Plan(plan_options) => {
                Box::new(plan::PlanCommand { plan_options })
            }
            crate::cli::Command::Teardown(teardown_options) => {
                Box::new(teardown::TeardownCommand { teardown_options })
            }
            crate::cli::Command::Template => Box::new(template::TemplateCommand {}),
        }
    }
}
