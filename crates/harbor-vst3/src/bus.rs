//! Bus negotiation.
//!
//! Harbor routes the first audio bus in each direction and the first event
//! input bus. Other buses are counted but left inactive.

use harbor_core::{BusLayout, HostResult};
use log::{debug, warn};
use vst3::Steinberg::kResultOk;
use vst3::Steinberg::Vst::{
    BusDirection, BusDirections, BusDirections_, BusInfo, IComponent, IComponentTrait as _, MediaType,
    MediaTypes_,
};
use vst3::ComPtr;

use crate::util::text_from_wide;

const MAIN_BUS: i32 = 0;

/// Read the plugin's bus counts and bus-0 channel counts.
pub fn negotiate(component: &ComPtr<IComponent>) -> HostResult<BusLayout> {
    let (input_buses, input_channels) = audio_bus(component, BusDirections_::kInput as BusDirection);
    let (output_buses, output_channels) =
        audio_bus(component, BusDirections_::kOutput as BusDirection);

    // SAFETY: Component pointer is valid while the handle is alive.
    let event_inputs = unsafe {
        component.getBusCount(
            MediaTypes_::kEvent as MediaType,
            BusDirections_::kInput as BusDirection,
        )
    };

    let layout = BusLayout {
        input_buses,
        output_buses,
        input_channels,
        output_channels,
        has_event_input: event_inputs > 0,
    };
    layout.validate()?;
    debug!(
        "Negotiated buses: {input_channels} in ({input_buses} buses), \
         {output_channels} out ({output_buses} buses), event input: {}",
        layout.has_event_input
    );
    Ok(layout)
}

/// Bus count and bus-0 channel count for one audio direction.
fn audio_bus(component: &ComPtr<IComponent>, direction: BusDirection) -> (usize, usize) {
    let media = MediaTypes_::kAudio as MediaType;
    // SAFETY: Component pointer is valid while the handle is alive.
    let count = unsafe { component.getBusCount(media, direction) }.max(0) as usize;
    if count == 0 {
        return (0, 0);
    }

    // SAFETY: BusInfo is plain C data; all-zero is a valid value.
    let mut info: BusInfo = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid out-parameter for the duration of the call.
    let result = unsafe { component.getBusInfo(media, direction, MAIN_BUS, &mut info) };
    if result != kResultOk {
        warn!(
            "getBusInfo failed for {} bus 0 (result={result}), treating it as 0 channels",
            direction_name(direction)
        );
        return (count, 0);
    }

    let name = text_from_wide::<128>(&info.name);
    debug!(
        "Audio {} bus 0 \"{name}\": {} channels",
        direction_name(direction),
        info.channelCount
    );
    (count, info.channelCount.max(0) as usize)
}

/// Activate the routed buses. Failures are logged; a plugin that refuses
/// activation usually still processes its default-active buses.
pub fn activate_main_buses(component: &ComPtr<IComponent>, layout: &BusLayout) {
    let audio = MediaTypes_::kAudio as MediaType;
    let event = MediaTypes_::kEvent as MediaType;
    let input = BusDirections_::kInput as BusDirection;
    let output = BusDirections_::kOutput as BusDirection;

    if layout.has_audio_input() {
        activate(component, audio, input);
    }
    if layout.has_audio_output() {
        activate(component, audio, output);
    }
    if layout.has_event_input {
        activate(component, event, input);
    }
}

fn activate(component: &ComPtr<IComponent>, media: MediaType, direction: BusDirection) {
    // SAFETY: Component pointer is valid while the handle is alive.
    let result = unsafe { component.activateBus(media, direction, MAIN_BUS, 1) };
    if result != kResultOk {
        warn!(
            "activateBus(media={media}, {}, 0) failed (result={result})",
            direction_name(direction)
        );
    }
}

fn direction_name(direction: BusDirection) -> &'static str {
    match direction as BusDirections {
        BusDirections_::kInput => "input",
        _ => "output",
    }
}
