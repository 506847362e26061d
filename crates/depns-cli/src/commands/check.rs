use miette::Result;

use depns_resolver::VersionRequirement;

pub fn exec(requirement: &str, versions: &[String]) -> Result<()> {
    let requirement = VersionRequirement::create(requirement)?;
    tracing::debug!("Parsed requirement {}", requirement.root());

    let mut unsatisfied = 0;
    for version in versions {
        if requirement.satisfied_by(version)? {
            println!("{version}: satisfied");
        } else {
            println!("{version}: unsatisfied");
            unsatisfied += 1;
        }
    }

    if unsatisfied > 0 {
        return Err(miette::miette!(
            "{unsatisfied} of {} versions do not satisfy {requirement}",
            versions.len()
        ));
    }
    Ok(())
}
