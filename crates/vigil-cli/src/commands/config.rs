use vigil_ai::ServerConfig;

pub fn run() -> Result<(), String> {
    let json = ServerConfig::default().to_json().map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
