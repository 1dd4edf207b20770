fn main() {
    println!("cargo:rerun-if-changed=./tools.proto");
    tonic_build::compile_protos("./tools.proto")
        .unwrap_or_else(|err| panic!("Failed to compile protos {:?}", err));
}
