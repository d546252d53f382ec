use colored::Colorize;
use ec2flow_cloud::KNOWN_REGIONS;

pub fn handle() {
    println!("{}", "Valid AWS regions:".bold());
    for (code, name) in KNOWN_REGIONS {
        println!("[{}] located in {}", code.cyan(), name);
    }
}
