use miette::Result;

use depns_resolver::VersionRequirement;

pub fn exec(requirement: &str) -> Result<()> {
    let requirement = VersionRequirement::create(requirement)?;
    match requirement.default() {
        Some(version) => println!("{version}"),
        None => println!("(none)"),
    }
    Ok(())
}
