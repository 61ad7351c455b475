//! CRD YAML Generator
//!
//! Prints the DNS CRD manifest, for installing the CRD ahead of the operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/dns.yaml

use pikube_dns_operator::crd::generate_crds;

fn main() {
    for crd in generate_crds() {
        println!("---");
        print!("{}", crd);
    }
}
