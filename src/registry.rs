//! Реестр callback-хэндлов.
//!
//! Хэндл — ячейка `c_int` в нативной куче (`libc::malloc`), в которой лежит id
//! callback'а. Движку уходит только адрес ячейки (`private`), сам callback
//! живёт в thread-local таблице id -> стёртый указатель на замыкание.
//!
//! Правила:
//! - ячейка выделяется до обхода и освобождается после, ровно один раз
//!   (`CallbackHandle`: не Clone, `release(self)` поглощает хэндл);
//! - запись в таблице существует только внутри `with_registration` и не
//!   может пережить заимствование замыкания;
//! - пока замыкание выполняется, его слот помечен busy: повторный вход в тот
//!   же id отклоняется (вложенные обходы идут через другие id).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, Ordering};

use log::debug;

use crate::entry::{DirEntry, Outcome};
use crate::errcode::ErrCode;
use crate::metrics;

static NEXT_ID: AtomicI32 = AtomicI32::new(1);

/// Следующий id callback'а (процессный счётчик; 0 не выдаётся).
pub fn next_id() -> c_int {
    loop {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        if id > 0 {
            return id;
        }
        // переполнение: начинаем заново с 1
        let _ = NEXT_ID.compare_exchange(id.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
    }
}

// ----- per-thread статистика хэндлов -----

thread_local! {
    static ALLOCATED: Cell<u64> = const { Cell::new(0) };
    static RELEASED: Cell<u64> = const { Cell::new(0) };
}

/// Счётчики alloc/free текущего потока.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub allocated: u64,
    pub released: u64,
}

impl HandleStats {
    pub fn live(&self) -> u64 {
        self.allocated.saturating_sub(self.released)
    }
}

pub fn handle_stats() -> HandleStats {
    HandleStats {
        allocated: ALLOCATED.with(Cell::get),
        released: RELEASED.with(Cell::get),
    }
}

// ----- сырые операции (alloc / free) -----

/// Выделить ячейку с `id` в нативной куче.
/// Возвращает null, если память не выделилась.
pub fn alloc_callback(id: c_int) -> *mut c_int {
    // SAFETY: malloc с ненулевым размером; результат проверяется на null.
    let cell = unsafe { libc::malloc(std::mem::size_of::<c_int>()) } as *mut c_int;
    if cell.is_null() {
        metrics::record_cb_handle_alloc_failure();
        return cell;
    }
    // SAFETY: ячейка свежая, выровнена malloc'ом под любой скалярный тип.
    unsafe { cell.write(id) };
    ALLOCATED.with(|c| c.set(c.get() + 1));
    metrics::record_cb_handle_alloc();
    cell
}

/// Освободить ячейку. null — no-op.
///
/// # Safety
/// `cell` получен из `alloc_callback` и ещё не освобождён.
pub unsafe fn free_callback(cell: *mut c_int) {
    if cell.is_null() {
        return;
    }
    libc::free(cell as *mut c_void);
    RELEASED.with(|c| c.set(c.get() + 1));
    metrics::record_cb_handle_free();
}

// ----- RAII хэндл -----

/// Хэндл callback'а: владеет нативной ячейкой с id.
///
/// Освобождается ровно один раз — в `release` или в `Drop`. Повторный
/// `release` не компилируется:
///
/// ```compile_fail
/// use e2walk::registry::CallbackHandle;
///
/// let h = CallbackHandle::acquire(7).unwrap();
/// h.release();
/// h.release();
/// ```
///
/// Хэндл привязан к потоку (таблица callback'ов thread-local):
///
/// ```compile_fail
/// use e2walk::registry::CallbackHandle;
///
/// let h = CallbackHandle::acquire(7).unwrap();
/// std::thread::spawn(move || drop(h));
/// ```
#[derive(Debug)]
pub struct CallbackHandle {
    cell: NonNull<c_int>,
    _not_send: PhantomData<*mut ()>,
}

impl CallbackHandle {
    /// `EXT2_ET_NO_MEMORY`, если ячейка не выделилась.
    pub fn acquire(id: c_int) -> Result<CallbackHandle, ErrCode> {
        match NonNull::new(alloc_callback(id)) {
            Some(cell) => Ok(CallbackHandle {
                cell,
                _not_send: PhantomData,
            }),
            None => Err(ErrCode::NO_MEMORY),
        }
    }

    #[inline]
    pub fn id(&self) -> c_int {
        // SAFETY: ячейка жива, пока жив хэндл.
        unsafe { *self.cell.as_ptr() }
    }

    /// Адрес ячейки как непрозрачный `private` для движка.
    #[inline]
    pub fn as_private(&self) -> *mut c_void {
        self.cell.as_ptr() as *mut c_void
    }

    /// Явно освободить хэндл.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        // SAFETY: ячейка получена из alloc_callback; Drop выполняется один раз.
        unsafe { free_callback(self.cell.as_ptr()) }
    }
}

// ----- таблица callback'ов -----

type ErasedCallback = dyn FnMut(&mut DirEntry<'_>) -> Outcome;

struct Slot {
    f: *mut ErasedCallback,
    busy: bool,
}

thread_local! {
    static TABLE: RefCell<HashMap<c_int, Slot>> = RefCell::new(HashMap::new());
}

/// Регистрация замыкания под id. Существует только внутри
/// `with_registration`: наружу выдаётся лишь `&Registration`, поэтому
/// ни переместить, ни «забыть» её нельзя, и запись в таблице всегда
/// удаляется до того, как заимствование замыкания закончится.
///
/// Вынести регистрацию из скоупа не компилируется:
///
/// ```compile_fail
/// use e2walk::registry::{next_id, with_registration};
/// use e2walk::{DirEntry, Outcome};
///
/// let mut f = |_: &mut DirEntry<'_>| Outcome::Continue;
/// let leaked = with_registration(next_id(), &mut f, |reg| reg).unwrap();
/// ```
///
/// Конструктора вне модуля нет:
///
/// ```compile_fail
/// use e2walk::registry::register;
/// ```
pub struct Registration {
    id: c_int,
    _not_send: PhantomData<*mut ()>,
}

impl Registration {
    pub fn id(&self) -> c_int {
        self.id
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Err(e) = TABLE.try_with(|t| t.borrow_mut().remove(&self.id)) {
            debug!("registry: callback {} not removed, table gone: {}", self.id, e);
        }
    }
}

/// Зарегистрировать `f` под `id` на время вызова `body`.
///
/// Пока выполняется `body`, `dispatch(id, ..)` (и трамплин) вызывает `f`.
/// Запись удаляется при выходе из `body`, в том числе при панике.
/// `EXT2_ET_INVALID_ARGUMENT`, если id уже занят в этом потоке; `body`
/// тогда не вызывается.
pub fn with_registration<'a, F, R>(
    id: c_int,
    f: &'a mut F,
    body: impl FnOnce(&Registration) -> R,
) -> Result<R, ErrCode>
where
    F: FnMut(&mut DirEntry<'_>) -> Outcome + 'a,
{
    let short: *mut (dyn FnMut(&mut DirEntry<'_>) -> Outcome + 'a) = f;
    // SAFETY: стирается только время жизни. Указатель разыменовывается лишь
    // пока запись в таблице существует; запись удаляет Drop регистрации,
    // которая живёт только в этом кадре стека, а `f` заимствован на 'a,
    // что покрывает весь вызов.
    let erased: *mut ErasedCallback = unsafe { std::mem::transmute(short) };

    TABLE.with(|t| {
        let mut t = t.borrow_mut();
        if t.contains_key(&id) {
            return Err(ErrCode::INVALID_ARGUMENT);
        }
        t.insert(id, Slot { f: erased, busy: false });
        Ok(())
    })?;
    debug!("registry: callback {} registered", id);
    let reg = Registration {
        id,
        _not_send: PhantomData,
    };
    Ok(body(&reg))
}

/// Зарегистрирован ли id в текущем потоке.
pub fn is_registered(id: c_int) -> bool {
    TABLE.with(|t| t.borrow().contains_key(&id))
}

struct BusyGuard(c_int);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let res = TABLE.try_with(|t| {
            if let Some(slot) = t.borrow_mut().get_mut(&self.0) {
                slot.busy = false;
            }
        });
        if let Err(e) = res {
            debug!("registry: busy flag of {} not cleared, table gone: {}", self.0, e);
        }
    }
}

/// Вызвать замыкание, зарегистрированное под `id`.
///
/// `None` — id неизвестен в этом потоке или его замыкание уже выполняется.
/// Таблица не заимствована во время вызова замыкания.
pub fn dispatch(id: c_int, entry: &mut DirEntry<'_>) -> Option<Outcome> {
    let f = TABLE.with(|t| {
        let mut t = t.borrow_mut();
        let slot = t.get_mut(&id)?;
        if slot.busy {
            return None;
        }
        slot.busy = true;
        Some(slot.f)
    })?;
    let _busy = BusyGuard(id);
    // SAFETY: слот существует => Registration жива => замыкание заимствовано
    // и не перемещено; busy исключает второе &mut на то же замыкание.
    Some(unsafe { (*f)(entry) })
}
