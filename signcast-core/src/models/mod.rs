pub mod content;
pub mod device;
pub mod display;
pub mod id;
pub mod schedule;

pub use content::{ContentItem, ContentKind};
pub use device::{AccessCode, Device, Orientation};
pub use display::{BackgroundImage, BackgroundMode, DefaultDisplay, LogoPosition};
pub use id::{ContentId, DeviceId, GroupId, ScheduleId};
pub use schedule::{DaySet, Schedule, ScheduleGroup, TimeOfDay, Transition, TransitionKind};
