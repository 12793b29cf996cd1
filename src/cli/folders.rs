use anyhow::Result;

use crate::{
    backup::list_folders,
    cli::{login, logout, runtime},
    config::AccountConfig,
};

pub fn folders(account: &AccountConfig) -> Result<()> {
    runtime()?.block_on(async {
        let mut session = login(account).await?;
        let folders = list_folders(&mut session).await?;
        logout(session).await;

        for folder in folders {
            println!("{folder}");
        }
        anyhow::Ok(())
    })
}
