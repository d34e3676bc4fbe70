//! Change notifications broadcast by the player.
//!
//! On macOS the player posts `com.apple.Music.playerInfo` on the distributed
//! notification center whenever playback changes. The observer is registered
//! on the calling thread's run loop (the UI thread, which eframe keeps
//! spinning) and only forwards a wake-up; the synchronizer does the rest.

use std::sync::mpsc::Sender;

use crate::{
    error::{Error, Result},
    worker::Waker,
};

pub const PLAYER_INFO_NOTIFICATION: &str = "com.apple.Music.playerInfo";

/// Cheap handle the observer uses to flag "something changed".
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: Sender<()>,
    waker: Waker,
}

impl ChangeNotifier {
    pub fn new(tx: Sender<()>, waker: Waker) -> Self {
        Self { tx, waker }
    }

    pub fn notify(&self) {
        if self.tx.send(()).is_ok() {
            (self.waker)();
        }
    }
}

/// Live observer registration. Dropping it unregisters the observer.
pub struct ChangeSubscription {
    name: String,
    #[cfg(target_os = "macos")]
    inner: macos::Observer,
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(target_os = "macos")]
pub fn subscribe(name: &str, notifier: ChangeNotifier) -> Result<ChangeSubscription> {
    let inner = macos::Observer::register(name, notifier)?;
    tracing::info!(name, "subscribed to player notifications");
    Ok(ChangeSubscription {
        name: name.to_string(),
        inner,
    })
}

#[cfg(not(target_os = "macos"))]
pub fn subscribe(name: &str, notifier: ChangeNotifier) -> Result<ChangeSubscription> {
    let _ = notifier;
    Err(Error::Subscription(format!(
        "{name}: distributed notifications need macOS"
    )))
}

#[cfg(target_os = "macos")]
impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.inner.unregister();
        tracing::info!(name = %self.name, "unsubscribed from player notifications");
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use std::{ffi::c_void, ptr, sync::Once};

    use objc::{
        class,
        declare::ClassDecl,
        msg_send,
        runtime::{Class, Object, Sel},
        sel, sel_impl,
    };

    use super::{ChangeNotifier, Error, Result};

    const OBSERVER_CLASS: &str = "MiniPlayerChangeObserver";
    const NOTIFIER_IVAR: &str = "_notifier";
    const NS_UTF8_STRING_ENCODING: usize = 4;
    const DELIVER_IMMEDIATELY: usize = 4;

    #[link(name = "Foundation", kind = "framework")]
    extern "C" {}

    extern "C" fn handle_player_info(this: &Object, _: Sel, _: *mut Object) {
        unsafe {
            let raw: *mut c_void = *this.get_ivar(NOTIFIER_IVAR);
            if let Some(notifier) = (raw as *const ChangeNotifier).as_ref() {
                notifier.notify();
            }
        }
    }

    fn observer_class() -> Option<&'static Class> {
        static REGISTER: Once = Once::new();
        REGISTER.call_once(|| {
            let Some(mut decl) = ClassDecl::new(OBSERVER_CLASS, class!(NSObject)) else {
                return;
            };
            decl.add_ivar::<*mut c_void>(NOTIFIER_IVAR);
            unsafe {
                decl.add_method(
                    sel!(playerInfoChanged:),
                    handle_player_info as extern "C" fn(&Object, Sel, *mut Object),
                );
            }
            decl.register();
        });
        Class::get(OBSERVER_CLASS)
    }

    unsafe fn ns_string(value: &str) -> *mut Object {
        let alloc: *mut Object = msg_send![class!(NSString), alloc];
        msg_send![alloc,
            initWithBytes: value.as_ptr()
            length: value.len()
            encoding: NS_UTF8_STRING_ENCODING
        ]
    }

    pub(super) struct Observer {
        object: *mut Object,
        notifier: *mut ChangeNotifier,
    }

    impl Observer {
        pub(super) fn register(name: &str, notifier: ChangeNotifier) -> Result<Self> {
            let class = observer_class()
                .ok_or_else(|| Error::Subscription("observer class unavailable".into()))?;

            unsafe {
                let center: *mut Object =
                    msg_send![class!(NSDistributedNotificationCenter), defaultCenter];
                if center.is_null() {
                    return Err(Error::Subscription(
                        "distributed notification center unavailable".into(),
                    ));
                }

                let object: *mut Object = msg_send![class, new];
                if object.is_null() {
                    return Err(Error::Subscription("failed to create observer".into()));
                }
                let notifier = Box::into_raw(Box::new(notifier));
                (*object).set_ivar(NOTIFIER_IVAR, notifier as *mut c_void);

                let ns_name = ns_string(name);
                let _: () = msg_send![center,
                    addObserver: object
                    selector: sel!(playerInfoChanged:)
                    name: ns_name
                    object: ptr::null_mut::<Object>()
                    suspensionBehavior: DELIVER_IMMEDIATELY
                ];
                let _: () = msg_send![ns_name, release];

                Ok(Self { object, notifier })
            }
        }

        pub(super) fn unregister(&mut self) {
            if self.object.is_null() {
                return;
            }
            unsafe {
                let center: *mut Object =
                    msg_send![class!(NSDistributedNotificationCenter), defaultCenter];
                if !center.is_null() {
                    let _: () = msg_send![center, removeObserver: self.object];
                }
                (*self.object).set_ivar(NOTIFIER_IVAR, ptr::null_mut::<c_void>());
                let _: () = msg_send![self.object, release];
                drop(Box::from_raw(self.notifier));
            }
            self.object = ptr::null_mut();
            self.notifier = ptr::null_mut();
        }
    }
}
