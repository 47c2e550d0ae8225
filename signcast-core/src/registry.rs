//! In-memory registry of groups, schedules, content, and devices.
//!
//! The relational layer is an external collaborator of this system; the
//! registry provides its interface in-process. All mutations are serialised
//! behind one `RwLock`; reads take the shared lock and clone out, so the
//! resolver can run concurrently with no further locking.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use crate::models::{
    AccessCode, BackgroundImage, ContentId, ContentItem, ContentKind, DaySet, DefaultDisplay,
    Device, DeviceId, GroupId, Orientation, Schedule, ScheduleGroup, ScheduleId, TimeOfDay,
    Transition,
};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    next_group_id: i64,
    next_schedule_id: i64,
    next_content_id: i64,
    next_device_id: i64,
    groups: BTreeMap<GroupId, ScheduleGroup>,
    schedules: BTreeMap<ScheduleId, Schedule>,
    content: BTreeMap<ContentId, ContentItem>,
    devices: BTreeMap<DeviceId, Device>,
    default_display: DefaultDisplay,
}

pub struct Registry {
    inner: RwLock<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                default_display: DefaultDisplay::default(),
                ..Inner::default()
            }),
        }
    }

    // ==================== Schedule groups ====================

    pub fn create_group(&self, name: impl Into<String>, transition: Transition) -> ScheduleGroup {
        let mut inner = self.inner.write();
        inner.next_group_id += 1;
        let group = ScheduleGroup {
            id: GroupId::new(inner.next_group_id),
            name: name.into(),
            is_active: true,
            transition,
        };
        inner.groups.insert(group.id, group.clone());
        group
    }

    pub fn group(&self, id: GroupId) -> Result<ScheduleGroup> {
        self.inner
            .read()
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Schedule group {id} not found")))
    }

    #[must_use]
    pub fn groups(&self) -> Vec<ScheduleGroup> {
        self.inner.read().groups.values().cloned().collect()
    }

    pub fn set_group_active(&self, id: GroupId, is_active: bool) -> Result<ScheduleGroup> {
        let mut inner = self.inner.write();
        let group = inner
            .groups
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Schedule group {id} not found")))?;
        group.is_active = is_active;
        Ok(group.clone())
    }

    pub fn set_group_transition(&self, id: GroupId, transition: Transition) -> Result<ScheduleGroup> {
        let mut inner = self.inner.write();
        let group = inner
            .groups
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Schedule group {id} not found")))?;
        group.transition = transition;
        Ok(group.clone())
    }

    /// Delete a group, cascading to its schedules and content. Devices
    /// bound to it are left unbound. Returns the filenames of removed
    /// content so the upload layer can delete the bytes.
    pub fn delete_group(&self, id: GroupId) -> Result<Vec<String>> {
        let mut inner = self.inner.write();
        if inner.groups.remove(&id).is_none() {
            return Err(Error::NotFound(format!("Schedule group {id} not found")));
        }
        inner.schedules.retain(|_, s| s.group_id != id);
        let mut removed = Vec::new();
        inner.content.retain(|_, c| {
            if c.group_id == id {
                removed.push(c.filename.clone());
                false
            } else {
                true
            }
        });
        for device in inner.devices.values_mut() {
            if device.group_id == Some(id) {
                device.group_id = None;
            }
        }
        info!(group_id = id.as_i64(), removed = removed.len(), "Deleted schedule group");
        Ok(removed)
    }

    // ==================== Schedules ====================

    pub fn create_schedule(
        &self,
        group_id: GroupId,
        name: impl Into<String>,
        start: TimeOfDay,
        end: TimeOfDay,
        days: DaySet,
        priority: i32,
    ) -> Result<Schedule> {
        let mut inner = self.inner.write();
        if !inner.groups.contains_key(&group_id) {
            return Err(Error::NotFound(format!("Schedule group {group_id} not found")));
        }
        inner.next_schedule_id += 1;
        let schedule = Schedule {
            id: ScheduleId::new(inner.next_schedule_id),
            group_id,
            name: name.into(),
            start,
            end,
            days,
            priority,
            is_active: true,
        };
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    pub fn set_schedule_active(&self, id: ScheduleId, is_active: bool) -> Result<Schedule> {
        let mut inner = self.inner.write();
        let schedule = inner
            .schedules
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Schedule {id} not found")))?;
        schedule.is_active = is_active;
        Ok(schedule.clone())
    }

    pub fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .schedules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Schedule {id} not found")))
    }

    /// Schedules of a group, ascending by id.
    #[must_use]
    pub fn schedules_for_group(&self, group_id: GroupId) -> Vec<Schedule> {
        self.inner
            .read()
            .schedules
            .values()
            .filter(|s| s.group_id == group_id)
            .cloned()
            .collect()
    }

    // ==================== Content items ====================

    pub fn add_content(
        &self,
        group_id: GroupId,
        name: impl Into<String>,
        original_filename: &str,
        kind: ContentKind,
        file_size: u64,
        display_duration: f64,
    ) -> Result<ContentItem> {
        let mut inner = self.inner.write();
        if !inner.groups.contains_key(&group_id) {
            return Err(Error::NotFound(format!("Schedule group {group_id} not found")));
        }
        inner.next_content_id += 1;
        let order = inner
            .content
            .values()
            .filter(|c| c.group_id == group_id)
            .map(|c| c.order + 1)
            .max()
            .unwrap_or(0);
        let item = ContentItem {
            id: ContentId::new(inner.next_content_id),
            group_id,
            name: name.into(),
            filename: ContentItem::stable_filename(original_filename),
            kind,
            file_size,
            display_duration,
            order,
            is_active: true,
        };
        inner.content.insert(item.id, item.clone());
        Ok(item)
    }

    pub fn content_item(&self, id: ContentId) -> Result<ContentItem> {
        self.inner
            .read()
            .content
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Content item {id} not found")))
    }

    pub fn set_content_active(&self, id: ContentId, is_active: bool) -> Result<ContentItem> {
        self.update_content(id, |item| item.is_active = is_active)
    }

    pub fn set_content_order(&self, id: ContentId, order: i32) -> Result<ContentItem> {
        self.update_content(id, |item| item.order = order)
    }

    pub fn set_display_duration(&self, id: ContentId, seconds: f64) -> Result<ContentItem> {
        if seconds <= 0.0 {
            return Err(Error::InvalidInput(
                "Display duration must be positive".to_string(),
            ));
        }
        self.update_content(id, |item| item.display_duration = seconds)
    }

    /// Record a video's intrinsic duration once the probe reports it.
    pub fn set_intrinsic_duration(&self, id: ContentId, seconds: Option<f64>) -> Result<ContentItem> {
        let mut inner = self.inner.write();
        let item = inner
            .content
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Content item {id} not found")))?;
        if !item.kind.is_video() {
            return Err(Error::InvalidInput(
                "Intrinsic duration only applies to videos".to_string(),
            ));
        }
        item.kind = ContentKind::Video {
            intrinsic_duration: seconds,
        };
        Ok(item.clone())
    }

    pub fn delete_content(&self, id: ContentId) -> Result<String> {
        let mut inner = self.inner.write();
        inner
            .content
            .remove(&id)
            .map(|item| item.filename)
            .ok_or_else(|| Error::NotFound(format!("Content item {id} not found")))
    }

    fn update_content(&self, id: ContentId, f: impl FnOnce(&mut ContentItem)) -> Result<ContentItem> {
        let mut inner = self.inner.write();
        let item = inner
            .content
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Content item {id} not found")))?;
        f(item);
        Ok(item.clone())
    }

    /// All content of a group, display order.
    #[must_use]
    pub fn content_for_group(&self, group_id: GroupId) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self
            .inner
            .read()
            .content
            .values()
            .filter(|c| c.group_id == group_id)
            .cloned()
            .collect();
        items.sort_by_key(|c| (c.order, c.id));
        items
    }

    /// The group's active items in display order: the playlist the sync
    /// origin is minted over.
    #[must_use]
    pub fn active_playlist(&self, group_id: GroupId) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self
            .inner
            .read()
            .content
            .values()
            .filter(|c| c.group_id == group_id && c.is_active)
            .cloned()
            .collect();
        items.sort_by_key(|c| (c.order, c.id));
        items
    }

    // ==================== Devices ====================

    /// Create a device with a freshly allocated access code, unique among
    /// current devices (rejection sampling over the 10^6 namespace).
    pub fn create_device(&self, name: impl Into<String>) -> Device {
        let mut inner = self.inner.write();
        let code = Self::allocate_code(&inner);
        inner.next_device_id += 1;
        let device = Device::new(DeviceId::new(inner.next_device_id), name.into(), code);
        inner.devices.insert(device.id, device.clone());
        device
    }

    fn allocate_code(inner: &Inner) -> AccessCode {
        let mut rng = rand::rng();
        loop {
            let code = AccessCode::generate(&mut rng);
            if !inner.devices.values().any(|d| d.access_code == code) {
                return code;
            }
        }
    }

    pub fn device(&self, id: DeviceId) -> Result<Device> {
        self.inner
            .read()
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Device {id} not found")))
    }

    pub fn device_by_code(&self, code: &AccessCode) -> Result<Device> {
        self.inner
            .read()
            .devices
            .values()
            .find(|d| &d.access_code == code)
            .cloned()
            .ok_or_else(|| Error::NotFound("Unknown access code".to_string()))
    }

    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.inner.read().devices.values().cloned().collect()
    }

    /// Redeem an access code, binding the device. Idempotent: a code that
    /// is already bound binds again successfully.
    pub fn bind_device(&self, code: &AccessCode) -> Result<Device> {
        let mut inner = self.inner.write();
        let device = inner
            .devices
            .values_mut()
            .find(|d| &d.access_code == code)
            .ok_or_else(|| Error::NotFound("Unknown access code".to_string()))?;
        if !device.is_active {
            return Err(Error::Forbidden("Device is inactive".to_string()));
        }
        device.is_bound = true;
        device.last_seen = Some(Utc::now());
        Ok(device.clone())
    }

    /// Replace the device's access code with a fresh one. The old code
    /// stops resolving and the binding is invalidated; the player must
    /// re-enrol.
    pub fn rotate_access_code(&self, id: DeviceId) -> Result<Device> {
        let mut inner = self.inner.write();
        if !inner.devices.contains_key(&id) {
            return Err(Error::NotFound(format!("Device {id} not found")));
        }
        let code = Self::allocate_code(&inner);
        let device = inner
            .devices
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Device {id} not found")))?;
        device.access_code = code;
        device.is_bound = false;
        info!(device_id = id.as_i64(), "Rotated access code");
        Ok(device.clone())
    }

    pub fn assign_group(&self, id: DeviceId, group_id: Option<GroupId>) -> Result<Device> {
        let mut inner = self.inner.write();
        if let Some(group_id) = group_id {
            if !inner.groups.contains_key(&group_id) {
                return Err(Error::NotFound(format!("Schedule group {group_id} not found")));
            }
        }
        let device = inner
            .devices
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Device {id} not found")))?;
        device.group_id = group_id;
        Ok(device.clone())
    }

    pub fn set_device_active(&self, id: DeviceId, is_active: bool) -> Result<Device> {
        self.update_device(id, |d| d.is_active = is_active)
    }

    pub fn set_orientation(
        &self,
        id: DeviceId,
        orientation: Orientation,
        flip_horizontal: bool,
        flip_vertical: bool,
    ) -> Result<Device> {
        self.update_device(id, |d| {
            d.orientation = orientation;
            d.flip_horizontal = flip_horizontal;
            d.flip_vertical = flip_vertical;
        })
    }

    /// Mark the device seen now; used by config/playlist fetches.
    pub fn touch_device(&self, code: &AccessCode) -> Result<Device> {
        let mut inner = self.inner.write();
        let device = inner
            .devices
            .values_mut()
            .find(|d| &d.access_code == code)
            .ok_or_else(|| Error::NotFound("Unknown access code".to_string()))?;
        device.last_seen = Some(Utc::now());
        device.is_online = true;
        Ok(device.clone())
    }

    /// Apply a heartbeat: presence plus whatever the renderer reported.
    pub fn heartbeat(
        &self,
        code: &AccessCode,
        ip_address: Option<String>,
        screen_width: Option<u32>,
        screen_height: Option<u32>,
    ) -> Result<Device> {
        let mut inner = self.inner.write();
        let device = inner
            .devices
            .values_mut()
            .find(|d| &d.access_code == code)
            .ok_or_else(|| Error::NotFound("Unknown access code".to_string()))?;
        device.last_seen = Some(Utc::now());
        device.is_online = true;
        if ip_address.is_some() {
            device.ip_address = ip_address;
        }
        if screen_width.is_some() {
            device.screen_width = screen_width;
        }
        if screen_height.is_some() {
            device.screen_height = screen_height;
        }
        Ok(device.clone())
    }

    pub fn mark_offline(&self, code: &AccessCode) {
        let mut inner = self.inner.write();
        if let Some(device) = inner.devices.values_mut().find(|d| &d.access_code == code) {
            device.is_online = false;
        }
    }

    pub fn delete_device(&self, id: DeviceId) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .devices
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Device {id} not found")))
    }

    fn update_device(&self, id: DeviceId, f: impl FnOnce(&mut Device)) -> Result<Device> {
        let mut inner = self.inner.write();
        let device = inner
            .devices
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Device {id} not found")))?;
        f(device);
        Ok(device.clone())
    }

    // ==================== Default display ====================

    #[must_use]
    pub fn default_display(&self) -> DefaultDisplay {
        self.inner.read().default_display.clone()
    }

    pub fn update_default_display(&self, display: DefaultDisplay) {
        self.inner.write().default_display = display;
    }

    pub fn add_background(&self, background: BackgroundImage) {
        self.inner.write().default_display.backgrounds.push(background);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_group_crud_and_cascade() {
        let registry = Registry::new();
        let group = registry.create_group("Lobby", Transition::cut());
        registry
            .create_schedule(
                group.id,
                "Always",
                "00:00".parse().unwrap(),
                "23:59".parse().unwrap(),
                DaySet::ALL,
                0,
            )
            .unwrap();
        registry
            .add_content(group.id, "A", "a.png", ContentKind::Image, 10, 10.0)
            .unwrap();

        let removed = registry.delete_group(group.id).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(registry.schedules_for_group(group.id).is_empty());
        assert!(registry.group(group.id).is_err());
    }

    #[test]
    fn test_content_order_assignment() {
        let registry = Registry::new();
        let group = registry.create_group("Lobby", Transition::cut());
        let a = registry
            .add_content(group.id, "A", "a.png", ContentKind::Image, 10, 10.0)
            .unwrap();
        let b = registry
            .add_content(group.id, "B", "b.png", ContentKind::Image, 10, 10.0)
            .unwrap();
        assert!(a.order < b.order);

        let playlist = registry.active_playlist(group.id);
        assert_eq!(playlist[0].id, a.id);
        assert_eq!(playlist[1].id, b.id);
    }

    #[test]
    fn test_active_playlist_filters_inactive() {
        let registry = Registry::new();
        let group = registry.create_group("Lobby", Transition::cut());
        let a = registry
            .add_content(group.id, "A", "a.png", ContentKind::Image, 10, 10.0)
            .unwrap();
        registry
            .add_content(group.id, "B", "b.png", ContentKind::Image, 10, 10.0)
            .unwrap();
        registry.set_content_active(a.id, false).unwrap();

        let playlist = registry.active_playlist(group.id);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist[0].name, "B");
    }

    #[test]
    fn test_access_codes_unique_under_pressure() {
        // 999 existing codes; the next allocation still terminates and is
        // distinct from every one of them.
        let registry = Registry::new();
        let mut seen = HashSet::new();
        for i in 0..999 {
            let device = registry.create_device(format!("device-{i}"));
            seen.insert(device.access_code.as_str().to_string());
        }
        assert_eq!(seen.len(), 999);

        let fresh = registry.create_device("one-more");
        assert!(!seen.contains(fresh.access_code.as_str()));
    }

    #[test]
    fn test_bind_is_idempotent() {
        let registry = Registry::new();
        let device = registry.create_device("kiosk");
        let first = registry.bind_device(&device.access_code).unwrap();
        assert!(first.is_bound);
        let again = registry.bind_device(&device.access_code).unwrap();
        assert!(again.is_bound);
    }

    #[test]
    fn test_bind_unknown_and_inactive() {
        let registry = Registry::new();
        let code: AccessCode = "123456".parse().unwrap();
        assert!(matches!(
            registry.bind_device(&code),
            Err(Error::NotFound(_))
        ));

        let device = registry.create_device("kiosk");
        registry.set_device_active(device.id, false).unwrap();
        assert!(matches!(
            registry.bind_device(&device.access_code),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_rotate_invalidates_binding() {
        let registry = Registry::new();
        let device = registry.create_device("kiosk");
        let old_code = device.access_code.clone();
        registry.bind_device(&old_code).unwrap();

        let rotated = registry.rotate_access_code(device.id).unwrap();
        assert_ne!(rotated.access_code, old_code);
        assert!(!rotated.is_bound);
        assert!(registry.device_by_code(&old_code).is_err());
    }

    #[test]
    fn test_heartbeat_updates_presence() {
        let registry = Registry::new();
        let device = registry.create_device("kiosk");
        let updated = registry
            .heartbeat(
                &device.access_code,
                Some("10.0.0.7".to_string()),
                Some(1920),
                Some(1080),
            )
            .unwrap();
        assert!(updated.is_online);
        assert_eq!(updated.screen_width, Some(1920));

        registry.mark_offline(&device.access_code);
        assert!(!registry.device(device.id).unwrap().is_online);
    }
}
