//! `setup-netns` and `setup-veth`: the two intermediate re-exec stages that
//! create and wire up a container's network namespace before `inner` joins
//! it by path.

use anyhow::Result;

pub fn setup_netns(cid: &str) -> Result<()> {
    cellar::netns::setup_netns(cid)?;
    Ok(())
}

pub fn setup_veth(cid: &str) -> Result<()> {
    cellar::netns::setup_veth(cid)?;
    Ok(())
}
