/// Starter environment file used when the service has none yet.
///
/// Every known variable is present but commented out, so loading the
/// template yields disabled assignments grouped under section comments.
pub fn generate_template(service_name: &str) -> String {
    format!(
        "# Environment configuration for {svc}
# This file is sourced by the service startup script
# Variables defined here become environment variables for the service

# Basic configuration
#ENABLED=true
#PORT=8080
#BIND_ADDRESS=0.0.0.0

# Logging
#LOG_LEVEL=INFO

# Paths
#CONFIG_DIR=/etc/{svc}
#DATA_DIR=/var/lib/{svc}

# User configuration
#USER={svc}

# Additional options
#EXTRA_ARGS=\"\"
",
        svc = service_name
    )
}
