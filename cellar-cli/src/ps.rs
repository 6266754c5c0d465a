//! `ps`: lists active containers.

use anyhow::Result;

pub fn ps() -> Result<()> {
    crate::require_root()?;

    println!("CONTAINER ID\tIMAGE\tCOMMAND");
    for container in cellar::inventory::list()? {
        let Some(pid) = container.pid else {
            continue;
        };
        let image = cellar::inventory::resolve_image_digest(&container.cid)
            .unwrap_or_else(|| "<none>".to_owned());
        let command = cellar::inventory::resolve_command(&container.cid, pid)
            .unwrap_or_else(|| "<none>".to_owned());
        println!("{}\t{image}\t{command}", container.cid);
    }
    Ok(())
}
