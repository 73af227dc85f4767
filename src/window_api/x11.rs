use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::instrument;
use xcb::{
    x::{self, Atom, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection, Xid,
};

use super::{application_name, ActiveWindowData, WindowObserver};

fn intern(conn: &Connection, name: &'static [u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_active_window(conn: &Connection, root: Window, active_window_atom: Atom) -> Result<Option<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>().first().copied())
}

fn get_title(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).into_owned())
}

/// Reads the focused window through EWMH properties of the root window.
pub struct LinuxWindowObserver {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl LinuxWindowObserver {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new(),
        })
    }

    fn executable_of(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
        );
        self.system
            .process(pid)
            .and_then(|v| v.exe())
            .and_then(|v| v.to_str())
            .map(application_name)
    }
}

impl WindowObserver for LinuxWindowObserver {
    #[instrument(skip(self))]
    fn active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        // Currently the application only supports 1 x11 screen.
        let root = self
            .connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .ok_or_else(|| anyhow!("Screen {} is not available", self.preferred_screen))?
            .root();

        let Some(active_window) =
            get_active_window(&self.connection, root, self.active_window_atom)?
        else {
            return Ok(None);
        };
        if active_window.is_none() {
            return Ok(None);
        }

        let title = get_title(&self.connection, active_window, self.window_name_atom)?;
        let app_name = match get_pid(&self.connection, active_window, self.pid_atom)? {
            Some(pid) => self.executable_of(pid).unwrap_or_else(|| "Unknown App".into()),
            None => "Unknown App".into(),
        };

        Ok(Some(ActiveWindowData {
            app_name: app_name.into(),
            title: title.into(),
            url: None,
        }))
    }
}
