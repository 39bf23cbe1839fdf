//! The `pollexam template` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("{}", pollexam_core::parser::json_template());
    Ok(())
}
