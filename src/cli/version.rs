/// Display version information
pub fn execute() {
    println!("wabridge {}", env!("CARGO_PKG_VERSION"));
    println!("WhatsApp bridge for the messaging backend");
}
