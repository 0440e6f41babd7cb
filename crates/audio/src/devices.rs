use cpal::traits::{DeviceTrait, HostTrait};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Looks a device up by name across every host, falling back to the default
/// device of the default host.
pub fn find_device(direction: Direction, target: Option<&str>) -> Option<cpal::Device> {
    if let Some(target) = target {
        for host_id in cpal::available_hosts() {
            let Ok(host) = cpal::host_from_id(host_id) else {
                continue;
            };
            let found = devices(&host, direction)
                .into_iter()
                .find(|device| device.name().map(|name| name == target).unwrap_or(false));
            if found.is_some() {
                return found;
            }
        }
        warn!(device = target, ?direction, "audio device not found, using default");
    }
    let host = cpal::default_host();
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

pub fn device_names(direction: Direction) -> Vec<String> {
    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            names.extend(
                devices(&host, direction)
                    .iter()
                    .filter_map(|device| device.name().ok()),
            );
        }
    }
    names
}

fn devices(host: &cpal::Host, direction: Direction) -> Vec<cpal::Device> {
    let listed = match direction {
        Direction::Input => host.input_devices().map(|devs| devs.collect::<Vec<_>>()),
        Direction::Output => host.output_devices().map(|devs| devs.collect::<Vec<_>>()),
    };
    listed.unwrap_or_default()
}
