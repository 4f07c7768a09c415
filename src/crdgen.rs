//! # CRD Generator
//!
//! Prints the `BtpOperator` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/bases/operator.kyma-project.io_btpoperators.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use btp_manager::crd::BtpOperator;
use kube::core::CustomResourceExt;

fn main() {
    let crd = BtpOperator::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
