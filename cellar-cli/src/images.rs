//! `images`: lists locally stored images, grouped by name with their tags
//! and digests indented beneath.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

pub fn images() -> Result<()> {
    crate::require_root()?;

    let oci = cellar_oci::Oci::open(Path::new(cellar::HOME))?;

    let mut by_name: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for (name, tag, digest) in oci.list()? {
        by_name.entry(name).or_default().push((tag, digest));
    }

    for (name, mut tags) in by_name {
        println!("{name}");
        tags.sort();
        for (tag, digest) in tags {
            println!("  {tag} {digest}");
        }
    }
    Ok(())
}
