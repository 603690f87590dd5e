//! CRD manifest generator
//!
//! Prints the ResourceRef, ResourceGroup, ResourceGroupDeployment, and
//! Resource CRD schemas as one multi-document YAML stream, ready to apply to
//! a cluster before the operator starts.
//!
//! Usage: cargo run --bin crdgen | kubectl apply -f -

use klaudio_operator::crd::generate_crds;

fn main() {
    for manifest in generate_crds() {
        println!("---");
        print!("{manifest}");
    }
}
