use std::convert::Infallible;

use clap::Args;

use hvsync_cli::BuildInfo;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = Infallible;
    type Output = BuildInfo;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(BuildInfo::current())
    }
}
