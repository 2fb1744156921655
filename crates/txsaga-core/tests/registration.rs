//! Integration tests for step registration and argument handling.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use txsaga_core::{
    Arg, BoxError, CallableRole, Context, MemoryStorage, Saga, SagaError, SubTx, TxHistory,
    TxId, ValidationRule, args,
};

type StepResult = Result<(), BoxError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Booking {
    guest: String,
    nights: u16,
}

struct BookRoom {
    cancelled: Arc<Mutex<Vec<Booking>>>,
}

impl SubTx for BookRoom {
    type Args = Booking;
    type Output = String;
    type Error = BoxError;

    fn id(&self) -> &'static str {
        "book_room"
    }

    fn execute(&self, _ctx: &Context, args: Booking) -> Result<String, BoxError> {
        Ok(format!("{}-{}", args.guest, args.nights))
    }

    fn compensate(&self, _ctx: &Context, args: Booking) -> Result<(), BoxError> {
        self.cancelled.lock().expect("lock").push(args);
        Ok(())
    }
}

struct Lookup;

impl SubTx for Lookup {
    type Args = (String, u8);
    type Output = ();
    type Error = BoxError;

    fn id(&self) -> &'static str {
        "lookup"
    }

    fn execute(&self, _ctx: &Context, _args: (String, u8)) -> Result<(), BoxError> {
        Ok(())
    }
}

#[test]
fn struct_step_runs_and_compensates_with_persisted_args() -> anyhow::Result<()> {
    let cancelled = Arc::new(Mutex::new(Vec::new()));
    let mut saga = Saga::new(MemoryStorage::new());
    saga.add_step(BookRoom {
        cancelled: Arc::clone(&cancelled),
    })?;
    saga.add_step(Lookup)?;
    let booking = Booking {
        guest: String::from("sam"),
        nights: 3,
    };

    let tx = saga.new_tx(Context::new(), "tx1");
    tx.start()?;
    let results = tx.execute_step_and_get_result("book_room", args![booking.clone()])?;
    tx.execute_step("lookup", args![(String::from("sam"), 1_u8)])?;
    tx.rollback(1)?;

    assert_eq!(
        results[0].downcast_ref::<String>().map(String::as_str),
        Some("sam-3")
    );
    assert_eq!(*cancelled.lock().expect("lock"), vec![booking]);
    Ok(())
}

#[test]
fn pointer_parameters_share_values_with_pointee() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let mut saga = Saga::new(MemoryStorage::new());
    saga.add_sub_tx(
        "book",
        |_ctx: &Context, booking: Box<Booking>| -> StepResult {
            assert_eq!(booking.nights, 2);
            Ok(())
        },
        move |_ctx: &Context, booking: Booking| -> StepResult {
            recorder.lock().expect("lock").push(booking);
            Ok(())
        },
    )?;

    let tx = saga.new_tx(Context::new(), "tx1");
    tx.start()?;
    tx.execute_step(
        "book",
        args![Booking {
            guest: String::from("pam"),
            nights: 2,
        }],
    )?;
    tx.rollback(1)?;

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].guest, "pam");
    Ok(())
}

#[test]
fn persisted_type_name_is_shared_by_pointer_and_pointee() -> anyhow::Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let mut saga = Saga::new(Arc::clone(&storage));
    saga.add_sub_tx(
        "book",
        |_ctx: &Context, _booking: Arc<Booking>| -> StepResult { Ok(()) },
        |_ctx: &Context, _booking: Booking| -> StepResult { Ok(()) },
    )?;

    let tx = saga.new_tx(Context::new(), "tx1");
    tx.start()?;
    tx.execute_step(
        "book",
        args![Arc::new(Booking {
            guest: String::from("kim"),
            nights: 1,
        })],
    )?;

    let raw = txsaga_core::Storage::read_all(storage.as_ref(), &TxId::from("tx1"))?;
    let history = TxHistory::from_encoded(&raw)?;
    assert_eq!(
        history.entries()[1].args[0].type_name,
        saga.types().name_of::<Booking>()?
    );
    assert_eq!(history.entries()[1].args[0].value, r#"{"guest":"kim","nights":1}"#);
    Ok(())
}

#[test]
fn mismatched_compensation_is_rejected_at_registration() {
    let mut saga = Saga::new(MemoryStorage::new());

    let err = saga
        .add_sub_tx(
            "transfer",
            |_ctx: &Context, _amount: i32, _from: String| -> StepResult { Ok(()) },
            |_ctx: &Context, _amount: i32| -> StepResult { Ok(()) },
        )
        .expect_err("compensation takes fewer parameters");

    assert!(matches!(err, SagaError::SignatureMismatch { step, .. } if step.as_str() == "transfer"));
    assert!(saga.step("transfer").is_err());
}

#[test]
fn dynamic_callable_without_context_is_rejected() {
    use txsaga_core::{Callable, Signature, Slot, TypeDescriptor};

    let mut saga = Saga::new(MemoryStorage::new());
    let action = Callable::dynamic(
        Signature::new(
            vec![Slot::Value(TypeDescriptor::of::<u32>())],
            vec![Slot::Error],
        ),
        |_ctx, _args| Ok(Vec::new()),
    );

    let err = saga
        .add_sub_tx(
            "dynamic",
            action,
            |_ctx: &Context, _value: u32| -> StepResult { Ok(()) },
        )
        .expect_err("no leading context");

    assert!(matches!(
        err,
        SagaError::Validation {
            role: CallableRole::Action,
            rule: ValidationRule::MissingContext,
            ..
        }
    ));
}

#[test]
fn dynamic_callable_runs_with_erased_arguments() -> anyhow::Result<()> {
    use txsaga_core::{Callable, Signature, Slot, TypeDescriptor};

    let mut saga = Saga::new(MemoryStorage::new());
    let signature = Signature::new(
        vec![Slot::Context, Slot::Value(TypeDescriptor::of::<u32>())],
        vec![Slot::Error, Slot::Value(TypeDescriptor::of::<u64>())],
    );
    let square = Callable::dynamic(signature, |_ctx, args: Vec<Arg>| {
        let value = args
            .first()
            .and_then(|arg| arg.downcast_ref::<u32>())
            .copied()
            .ok_or("missing value")?;
        Ok(vec![Arg::new(u64::from(value) * u64::from(value))])
    });
    saga.add_sub_tx(
        "square",
        square,
        |_ctx: &Context, _value: u32| -> StepResult { Ok(()) },
    )?;

    let tx = saga.new_tx(Context::new(), "tx1");
    tx.start()?;
    let results = tx.execute_step_and_get_result("square", args![12_u32])?;

    assert_eq!(results[0].downcast_ref::<u64>(), Some(&144));
    Ok(())
}

#[test]
fn extra_argument_fails_before_logging() -> anyhow::Result<()> {
    let mut saga = Saga::new(MemoryStorage::new());
    saga.add_sub_tx(
        "noop",
        |_ctx: &Context| -> StepResult { Ok(()) },
        |_ctx: &Context| -> StepResult { Ok(()) },
    )?;

    let tx = saga.new_tx(Context::new(), "tx1");
    tx.start()?;
    let err = tx
        .execute_step("noop", args![1_u8])
        .expect_err("too many arguments");

    assert!(matches!(err, SagaError::ArgumentMismatch { .. }));
    assert_eq!(tx.history()?.entries().len(), 1);
    Ok(())
}
