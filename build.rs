fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/deviceplugin/v1beta1/api.proto");

    // The plugin serves DevicePlugin and dials kubelet's Registration service.
    // Tests need the opposite halves, so generate both.
    tonic_build::configure()
        .format(true)
        .build_client(true)
        .build_server(true)
        .compile(
            &["proto/deviceplugin/v1beta1/api.proto"],
            &["proto/deviceplugin/v1beta1"],
        )?;
    Ok(())
}
