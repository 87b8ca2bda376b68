fn main() {
    // Wi-Fi credentials come from `.env` (or the environment) at build time
    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for key in ["WIFI_SSID", "WIFI_PASS"] {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => {
                println!("cargo:warning={key} is not set, Wi-Fi will not connect");
                println!("cargo:rustc-env={key}=");
            }
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
