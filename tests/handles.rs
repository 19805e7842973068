// tests/handles.rs
//
// Запуск только этого файла:
//   cargo test --test handles -- --nocapture
//
// Покрываем:
// 1) Баланс alloc/free хэндлов на случайных последовательностях обходов
//    (полный, stop, abort, ошибка движка) — oorandom.
// 2) Паника в callback'е: хэндл освобождён, паника доходит до вызывающего.
// 3) Сырой протокол: acquire -> with_registration { iterate } -> release.
// 4) Два потока с собственными сессиями.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use anyhow::Result;
use oorandom::Rand64;

use common::ImageBuilder;
use e2walk::consts::*;
use e2walk::registry::{self, handle_stats, CallbackHandle};
use e2walk::{trampoline, DirEntry, ErrCode, Outcome, Session, WalkError};

fn sample() -> (common::Image, u32, usize) {
    let mut b = ImageBuilder::new();
    let f = b.add_file(EXT2_ROOT_INO, "data", 2);
    for i in 0..20 {
        b.link(EXT2_ROOT_INO, &format!("n{}", i), f, EXT2_FT_REG_FILE);
    }
    // ".", "..", "data", n0..n19
    (b.build(), f, 23)
}

#[test]
fn handle_balance_across_random_walks() -> Result<()> {
    let (img, file_ino, m) = sample();
    let s = img.open();
    let mut rng = Rand64::new(0xE2_57A1_u128);

    for round in 0..200 {
        let before = handle_stats();
        match rng.rand_range(0..4) {
            0 => {
                let sum = s.walk_dir(EXT2_ROOT_INO, 0, |_| Outcome::Continue)?;
                assert_eq!(sum.dispatched as usize, m);
            }
            1 => {
                let k = rng.rand_range(1..m as u64 + 1);
                let mut n = 0u64;
                let sum = s.walk_dir(EXT2_ROOT_INO, 0, |_| {
                    n += 1;
                    if n == k {
                        Outcome::Stop
                    } else {
                        Outcome::Continue
                    }
                })?;
                assert_eq!(sum.dispatched, k);
            }
            2 => {
                let k = rng.rand_range(1..m as u64 + 1);
                let mut n = 0u64;
                let err = s
                    .walk_dir(EXT2_ROOT_INO, 0, |_| {
                        n += 1;
                        if n == k {
                            Outcome::Abort
                        } else {
                            Outcome::Continue
                        }
                    })
                    .unwrap_err();
                assert_eq!(err, WalkError::Aborted { dispatched: k });
            }
            _ => {
                let err = s.walk_dir(file_ino, 0, |_| Outcome::Continue).unwrap_err();
                assert_eq!(err, WalkError::Engine(ErrCode::NO_DIRECTORY));
            }
        }
        let after = handle_stats();
        assert_eq!(after.allocated, before.allocated + 1, "round {}", round);
        assert_eq!(after.released, before.released + 1, "round {}", round);
        assert_eq!(after.live(), before.live(), "round {}", round);
    }
    Ok(())
}

#[test]
fn panic_in_callback_releases_handle_and_propagates() -> Result<()> {
    let (img, _, m) = sample();
    let s = img.open();
    let before = handle_stats();

    let res = catch_unwind(AssertUnwindSafe(|| {
        s.walk_dir(EXT2_ROOT_INO, 0, |e| {
            if e.name() == b"n3" {
                panic!("boom");
            }
            Outcome::Continue
        })
    }));
    assert!(res.is_err());
    assert_eq!(handle_stats().live(), before.live());

    // сессия пригодна дальше
    let sum = s.walk_dir(EXT2_ROOT_INO, 0, |_| Outcome::Continue)?;
    assert_eq!(sum.dispatched as usize, m);
    Ok(())
}

#[test]
fn raw_protocol_roundtrip() -> Result<()> {
    let (img, _, m) = sample();
    let s = img.open();
    let before = handle_stats();

    let handle = CallbackHandle::acquire(registry::next_id())?;
    let mut count = 0usize;
    {
        let mut f = |_: &mut DirEntry<'_>| {
            count += 1;
            Outcome::Continue
        };
        registry::with_registration(handle.id(), &mut f, |reg| {
            assert!(registry::is_registered(reg.id()));
            trampoline::iterate(s.fs(), EXT2_ROOT_INO, 0, None, &handle)
        })??;
    }
    assert!(!registry::is_registered(handle.id()));
    handle.release();

    assert_eq!(count, m);
    assert_eq!(handle_stats().live(), before.live());
    Ok(())
}

#[test]
fn raw_cells_and_unregistered_ids() -> Result<()> {
    let (img, _, _) = sample();
    let s = img.open();

    let cell = registry::alloc_callback(registry::next_id());
    assert!(!cell.is_null());
    // id без зарегистрированного замыкания: движок прерывает обход
    let err = unsafe {
        s.fs()
            .dir_iterate(EXT2_ROOT_INO, 0, None, trampoline::walk_func, cell as *mut _)
    }
    .unwrap_err();
    assert_eq!(err, ErrCode::CALLBACK_ABORTED);
    unsafe { registry::free_callback(cell) };
    unsafe { registry::free_callback(std::ptr::null_mut()) };

    let err = unsafe {
        s.fs()
            .dir_iterate(EXT2_ROOT_INO, 0, None, trampoline::walk_func, std::ptr::null_mut())
    }
    .unwrap_err();
    assert_eq!(err, ErrCode::CALLBACK_ABORTED);
    Ok(())
}

#[test]
fn two_threads_with_own_sessions() -> Result<()> {
    fn assert_send<T: Send>() {}
    assert_send::<Session>();

    let workers: Vec<_> = (0..2)
        .map(|t| {
            thread::spawn(move || -> Result<u64> {
                let mut b = ImageBuilder::new();
                let f = b.add_file(EXT2_ROOT_INO, "seed", 1);
                for i in 0..(10 + t * 5) {
                    b.link(EXT2_ROOT_INO, &format!("t{}_{}", t, i), f, EXT2_FT_REG_FILE);
                }
                let img = b.build();
                let s = img.open();
                let mut total = 0;
                for _ in 0..50 {
                    total += s.walk_dir(EXT2_ROOT_INO, 0, |_| Outcome::Continue)?.dispatched;
                }
                let st = handle_stats();
                assert_eq!(st.allocated, 50);
                assert_eq!(st.live(), 0);
                Ok(total)
            })
        })
        .collect();

    let totals: Vec<u64> = workers
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .collect::<Result<_>>()?;
    assert_eq!(totals, vec![50 * 13, 50 * 18]);
    Ok(())
}
